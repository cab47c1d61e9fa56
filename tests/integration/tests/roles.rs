//! Role scenarios over the in-memory store.

use idm_core::{Error, QueryError};
use idm_model::{Role, SearchCriteria};
use idm_session::RoleQueryBuilder;

use crate::common::memory_session;

/// U1 is granted rt1 and rt2 in G1; revoking one leaves the other.
#[tokio::test]
async fn test_grant_check_and_revoke() -> anyhow::Result<()> {
    let (session, _) = memory_session(&["GROUP"]);
    let persistence = session.persistence();
    let u1 = persistence.create_user("U1").await?;
    let g1 = persistence.create_group("G1", "GROUP").await?;

    let roles = session.roles();
    let rt1 = roles.create_role_type("rt1").await?;
    let rt2 = roles.create_role_type("rt2").await?;
    roles.create_role(&rt1, &u1, &g1).await?;
    roles.create_role(&rt2, &u1, &g1).await?;

    assert!(roles.has_role(&u1, &g1, &rt1).await?);
    assert!(roles.has_role(&u1, &g1, &rt2).await?);
    let types = roles.find_role_types_of(&u1, &g1, &SearchCriteria::new()).await?;
    assert_eq!(types, vec![rt1.clone(), rt2.clone()]);

    roles.remove_role(&Role::new(rt1.clone(), u1.clone(), g1.clone())).await?;
    assert!(!roles.has_role(&u1, &g1, &rt1).await?);
    assert!(roles.has_role(&u1, &g1, &rt2).await?);

    let held = roles.find_roles_of_user(&u1, None).await?;
    assert_eq!(held, vec![Role::new(rt2.clone(), u1.clone(), g1.clone())]);
    Ok(())
}

/// Role grants do not count as membership, and memberships do not count as roles.
#[tokio::test]
async fn test_roles_are_separate_from_membership() -> anyhow::Result<()> {
    let (session, _) = memory_session(&["GROUP"]);
    let persistence = session.persistence();
    let alice = persistence.create_user("alice").await?;
    let bob = persistence.create_user("bob").await?;
    let staff = persistence.create_group("staff", "GROUP").await?;

    let roles = session.roles();
    let manager = roles.create_role_type("manager").await?;
    roles.create_role(&manager, &alice, &staff).await?;
    session.relationships().associate_user(&staff, &bob).await?;

    let criteria = SearchCriteria::new();
    assert_eq!(
        roles.find_users_with_related_role(&staff, &criteria).await?,
        vec![alice.clone()]
    );
    assert_eq!(
        session.relationships().find_associated_users(&staff, false, &criteria).await?,
        vec![bob.clone()]
    );
    assert_eq!(
        roles.find_groups_with_related_role(&alice, None, &criteria).await?,
        vec![staff.clone()]
    );
    assert!(roles
        .find_groups_with_related_role(&bob, None, &criteria)
        .await?
        .is_empty());
    Ok(())
}

/// Role queries resolve through the fixed coordinate table.
#[tokio::test]
async fn test_role_query_coordinates() -> anyhow::Result<()> {
    let (session, _) = memory_session(&["GROUP"]);
    let persistence = session.persistence();
    let u1 = persistence.create_user("U1").await?;
    let g1 = persistence.create_group("G1", "GROUP").await?;
    let g2 = persistence.create_group("G2", "GROUP").await?;
    let roles = session.roles();
    let rt1 = roles.create_role_type("rt1").await?;
    roles.create_role(&rt1, &u1, &g1).await?;
    roles.create_role(&rt1, &u1, &g2).await?;

    let mut builder = session.role_query_builder();
    builder.user(u1.clone()).group(g1.clone()).role_type(rt1.clone());
    let role = session.unique_result(&builder.create_query()).await?;
    assert_eq!(role, Some(Role::new(rt1.clone(), u1.clone(), g1.clone())));

    builder.reset().user(u1.clone()).role_type(rt1.clone());
    assert_eq!(session.list(&builder.create_query()).await?.len(), 2);

    builder.reset().role_type_name("rt1")?;
    let unsupported = session.list(&builder.create_query()).await;
    assert!(matches!(
        unsupported,
        Err(Error::Query(QueryError::UnsupportedCombination(_)))
    ));

    assert!(session.list(&RoleQueryBuilder::new().create_query()).await?.is_empty());
    Ok(())
}

/// Removing a role type revokes every grant of that type.
#[tokio::test]
async fn test_role_type_lifecycle() -> anyhow::Result<()> {
    let (session, _) = memory_session(&["GROUP"]);
    let u1 = session.persistence().create_user("U1").await?;
    let g1 = session.persistence().create_group("G1", "GROUP").await?;
    let roles = session.roles();
    let auditor = roles.create_role_type("auditor").await?;
    assert!(matches!(
        roles.create_role_type("auditor").await,
        Err(Error::AlreadyExists(_))
    ));
    assert_eq!(roles.get_role_type("auditor").await?, Some(auditor.clone()));
    assert_eq!(roles.role_type_count().await?, 1);

    roles.create_role(&auditor, &u1, &g1).await?;
    roles.remove_role_type(&auditor).await?;
    assert_eq!(roles.get_role_type("auditor").await?, None);
    assert_eq!(roles.role_type_count().await?, 0);
    assert!(roles.find_roles_of_group(&g1, None).await?.is_empty());
    Ok(())
}
