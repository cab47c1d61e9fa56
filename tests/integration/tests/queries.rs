//! Query builder scenarios over the in-memory store.

use idm_core::{Error, QueryError};
use idm_model::{Group, GroupKey, SearchCriteria, SortOrder, User};
use idm_session::{IdentitySession, QueryBuilder};

use crate::common::memory_session;

struct Directory {
    session: IdentitySession,
    sales: Group,
    emea: Group,
    berlin: Group,
    users: Vec<User>,
}

/// sales holds emea, emea holds berlin.
/// u1 is in sales, u2 and u3 in emea, u4 in berlin.
/// u2 and u4 are "lead" in sales.
async fn directory() -> anyhow::Result<Directory> {
    let (session, _) = memory_session(&["DIVISION", "REGION"]);
    let persistence = session.persistence();
    let sales = persistence.create_group("sales", "DIVISION").await?;
    let emea = persistence.create_group("emea", "REGION").await?;
    let berlin = persistence.create_group("berlin", "REGION").await?;
    let mut users = Vec::new();
    for id in ["u1", "u2", "u3", "u4"] {
        users.push(persistence.create_user(id).await?);
    }

    let relationships = session.relationships();
    relationships.associate_group(&sales, &emea).await?;
    relationships.associate_group(&emea, &berlin).await?;
    relationships.associate_user(&sales, &users[0]).await?;
    relationships.associate_users(&emea, &users[1..3]).await?;
    relationships.associate_user(&berlin, &users[3]).await?;

    let roles = session.roles();
    let lead = roles.create_role_type("lead").await?;
    roles.create_role(&lead, &users[1], &sales).await?;
    roles.create_role(&lead, &users[3], &sales).await?;

    Ok(Directory { session, sales, emea, berlin, users })
}

fn ids(users: &[User]) -> Vec<&str> {
    users.iter().map(User::id).collect()
}

/// Dimensions are AND-ed: members anywhere under sales who lead in sales.
#[tokio::test]
async fn test_user_dimensions_intersect() -> anyhow::Result<()> {
    let d = directory().await?;
    let mut builder = d.session.user_query_builder();

    builder.add_related_group(d.sales.clone());
    let related = d.session.list(&builder.create_query()).await?;
    assert_eq!(related.len(), 4);

    builder.add_role_group(d.sales.clone()).sort(SortOrder::Ascending);
    let leads = d.session.list(&builder.create_query()).await?;
    assert_eq!(ids(&leads), ["u2", "u4"]);

    builder.add_associated_group(d.emea.clone());
    let leads_in_emea = d.session.list(&builder.create_query()).await?;
    assert_eq!(ids(&leads_in_emea), ["u2"]);
    Ok(())
}

/// Paging applies once, after the merge.
#[tokio::test]
async fn test_paging_applies_after_merge() -> anyhow::Result<()> {
    let d = directory().await?;
    let mut builder = d.session.user_query_builder();
    builder
        .add_related_group(d.sales.clone())
        .add_associated_groups([d.emea.clone(), d.berlin.clone()])
        .sort(SortOrder::Descending)
        .page(0, 2);
    let page = d.session.list(&builder.create_query()).await?;
    assert_eq!(ids(&page), ["u4", "u3"]);

    builder.page(2, 2);
    let rest = d.session.list(&builder.create_query()).await?;
    assert_eq!(ids(&rest), ["u2"]);
    Ok(())
}

/// A query with a single dimension matches the direct manager lookup.
#[tokio::test]
async fn test_single_dimension_matches_direct_lookup() -> anyhow::Result<()> {
    let d = directory().await?;
    let criteria = SearchCriteria::new().sorted(SortOrder::Ascending).paged(1, 2);
    let direct = d.session.relationships().find_related_users(&d.emea, &criteria).await?;

    let mut builder = d.session.user_query_builder();
    builder
        .add_related_group(d.emea.clone())
        .sort(SortOrder::Ascending)
        .page(1, 2);
    assert_eq!(d.session.list(&builder.create_query()).await?, direct);
    Ok(())
}

/// Group queries: type filter, hierarchy and user dimensions.
#[tokio::test]
async fn test_group_dimensions() -> anyhow::Result<()> {
    let d = directory().await?;
    let mut builder = d.session.group_query_builder();

    builder.add_related_user(d.users[3].clone()).sort(SortOrder::Ascending);
    let above_u4 = d.session.list(&builder.create_query()).await?;
    assert_eq!(above_u4, vec![d.berlin.clone(), d.emea.clone(), d.sales.clone()]);

    builder.group_type("REGION")?;
    let regions = d.session.list(&builder.create_query()).await?;
    assert_eq!(regions, vec![d.berlin.clone(), d.emea.clone()]);

    builder.reset().add_role_user(d.users[1].clone());
    assert_eq!(d.session.list(&builder.create_query()).await?, vec![d.sales.clone()]);

    builder.reset().add_parent_group(d.sales.clone());
    assert_eq!(d.session.list(&builder.create_query()).await?, vec![d.emea.clone()]);

    builder.reset();
    assert!(matches!(
        d.session.list(&builder.create_query()).await,
        Err(Error::Query(QueryError::NotEnoughInformation))
    ));
    Ok(())
}

/// unique_result refuses several matches and accepts zero or one.
#[tokio::test]
async fn test_unique_result() -> anyhow::Result<()> {
    let d = directory().await?;
    let mut builder = d.session.user_query_builder();
    builder.add_associated_group(d.emea.clone());
    assert!(matches!(
        d.session.unique_result(&builder.create_query()).await,
        Err(Error::Query(QueryError::AmbiguousResult(2)))
    ));

    builder.id_filter("u3")?;
    let found = d.session.unique_result(&builder.create_query()).await?;
    assert_eq!(found, Some(d.users[2].clone()));

    builder.reset().user_id("nobody")?;
    assert_eq!(d.session.unique_result(&builder.create_query()).await?, None);
    Ok(())
}

/// A group key survives its text form and finds the group it names.
#[tokio::test]
async fn test_group_key_lookup() -> anyhow::Result<()> {
    let d = directory().await?;
    let text = d.emea.key().to_string();
    assert_eq!(text, "idm_group_id_._._REGION_._._emea");

    let key: GroupKey = text.parse()?;
    assert_eq!(key, d.emea.key());
    let found = d.session.persistence().find_group_by_key(&key).await?;
    assert_eq!(found, Some(d.emea.clone()));

    let mut builder = d.session.group_query_builder();
    builder.key_str(&text)?.add_child_group(d.berlin.clone());
    assert_eq!(d.session.list(&builder.create_query()).await?, vec![d.emea.clone()]);

    assert!(matches!(
        "emea".parse::<GroupKey>(),
        Err(Error::IllegalArgument(_))
    ));
    Ok(())
}
