//! Scenarios over the LDAP store and an in-process directory.

use idm_core::Error;
use idm_model::{Attributes, Direction, SearchCriteria, SortOrder};
use idm_session::QueryBuilder;

use crate::common::{ldap_session, GROUPS, PEOPLE, TEAMS};

/// Memberships land in `member` as DNs and cascade through nested groups.
#[tokio::test]
async fn test_nested_groups_by_dn() -> anyhow::Result<()> {
    let (session, directory) = ldap_session().await?;
    let persistence = session.persistence();
    let alice = persistence.create_user("alice").await?;
    let admins = persistence.create_group("admins", "GROUP").await?;
    let staff = persistence.create_group("staff", "GROUP").await?;

    let relationships = session.relationships();
    relationships.associate_group(&staff, &admins).await?;
    relationships.associate_user(&admins, &alice).await?;

    let admins_entry = directory
        .entry(&format!("cn=admins,{GROUPS}"))
        .ok_or_else(|| anyhow::anyhow!("admins entry missing"))?;
    assert_eq!(admins_entry.values("member"), [format!("uid=alice,{PEOPLE}")]);

    let criteria = SearchCriteria::new().sorted(SortOrder::Ascending);
    let groups = relationships.find_related_groups(&alice, None, &criteria).await?;
    assert_eq!(groups, vec![admins.clone(), staff.clone()]);

    let users = relationships.find_related_users(&staff, &criteria).await?;
    assert_eq!(users, vec![alice.clone()]);
    let direct = relationships.find_associated_users(&staff, false, &criteria).await?;
    assert!(direct.is_empty());

    relationships.disassociate_user(&admins, &alice).await?;
    assert!(!relationships.is_associated_user(&admins, &alice).await?);
    let admins_entry = directory
        .entry(&format!("cn=admins,{GROUPS}"))
        .ok_or_else(|| anyhow::anyhow!("admins entry missing"))?;
    assert_eq!(admins_entry.values("member"), ["cn=empty-membership-placeholder"]);

    assert_eq!(directory.open_contexts(), 0);
    Ok(())
}

/// `memberUid` references users by name; both directions resolve.
#[tokio::test]
async fn test_team_members_by_name() -> anyhow::Result<()> {
    let (session, directory) = ldap_session().await?;
    let persistence = session.persistence();
    let bob = persistence.create_user("bob").await?;
    let ops = persistence.create_group("ops", "TEAM").await?;
    session.relationships().associate_user(&ops, &bob).await?;

    let ops_entry = directory
        .entry(&format!("cn=ops,{TEAMS}"))
        .ok_or_else(|| anyhow::anyhow!("ops entry missing"))?;
    assert_eq!(ops_entry.values("memberUid"), ["bob"]);

    let criteria = SearchCriteria::new();
    let teams = session
        .relationships()
        .find_groups_of_user(&bob, Some("TEAM"), &criteria)
        .await?;
    assert_eq!(teams, vec![ops.clone()]);

    let mut builder = session.user_query_builder();
    builder.add_associated_group(ops.clone());
    assert_eq!(session.list(&builder.create_query()).await?, vec![bob.clone()]);

    // Teams may not hold groups.
    let nested = persistence.create_group("nested", "GROUP").await?;
    assert!(matches!(
        session.relationships().associate_group(&ops, &nested).await,
        Err(Error::OperationNotSupported(_))
    ));
    Ok(())
}

/// Sorting and paging over directory searches.
#[tokio::test]
async fn test_sorted_paged_search() -> anyhow::Result<()> {
    let (session, _) = ldap_session().await?;
    let persistence = session.persistence();
    for id in ["dora", "carl", "ann", "bert"] {
        persistence.create_user(id).await?;
    }

    let criteria = SearchCriteria::new().sorted(SortOrder::Descending).paged(1, 2);
    let users = persistence.find_users(&criteria).await?;
    let ids: Vec<&str> = users.iter().map(|u| u.id()).collect();
    assert_eq!(ids, ["carl", "bert"]);

    let mut builder = session.user_query_builder();
    builder.id_filter("*r*")?.sort(SortOrder::Ascending);
    let users = session.list(&builder.create_query()).await?;
    let ids: Vec<&str> = users.iter().map(|u| u.id()).collect();
    assert_eq!(ids, ["bert", "carl", "dora"]);
    Ok(())
}

/// Attributes map to directory names and identities can be removed.
#[tokio::test]
async fn test_attributes_and_removal() -> anyhow::Result<()> {
    let (session, directory) = ldap_session().await?;
    let persistence = session.persistence();
    let alice = persistence.create_user("alice").await?;
    let admins = persistence.create_group("admins", "GROUP").await?;
    session.relationships().associate_user(&admins, &alice).await?;

    let mut mail = Attributes::new();
    mail.insert("email".to_string(), vec!["alice@example.com".to_string()]);
    session.attributes().update_attributes(&alice, &mail).await?;
    let stored = directory
        .entry(&format!("uid=alice,{PEOPLE}"))
        .ok_or_else(|| anyhow::anyhow!("alice entry missing"))?;
    assert_eq!(stored.values("mail"), ["alice@example.com"]);
    assert_eq!(
        session.attributes().find_user_by_unique_attribute("email", "alice@example.com").await?,
        Some(alice.clone())
    );

    persistence.remove_user(&alice).await?;
    assert_eq!(persistence.find_user("alice").await?, None);
    let users = session
        .relationships()
        .find_associated_users(&admins, false, &SearchCriteria::new())
        .await?;
    assert!(users.is_empty());

    let children = session
        .relationships()
        .find_associated_groups(&admins, Direction::Children, None, false, &SearchCriteria::new())
        .await?;
    assert!(children.is_empty());
    Ok(())
}

/// The directory keeps no roles; role operations fail fast.
#[tokio::test]
async fn test_roles_are_not_supported() -> anyhow::Result<()> {
    let (session, directory) = ldap_session().await?;
    let alice = session.persistence().create_user("alice").await?;
    let admins = session.persistence().create_group("admins", "GROUP").await?;

    assert!(matches!(
        session.roles().create_role_type("manager").await,
        Err(Error::OperationNotSupported(_))
    ));

    let mut builder = session.group_query_builder();
    builder.add_role_user(alice.clone());
    assert!(matches!(
        session.list(&builder.create_query()).await,
        Err(Error::OperationNotSupported(_))
    ));

    let mut builder = session.user_query_builder();
    builder.add_associated_group(admins);
    assert!(session.list(&builder.create_query()).await?.is_empty());
    assert_eq!(directory.open_contexts(), 0);
    Ok(())
}
