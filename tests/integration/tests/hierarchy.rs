//! Group hierarchy scenarios over the in-memory store.

use idm_model::{Direction, Group, SearchCriteria, SortOrder};
use idm_session::{EventCategory, EventPhase, IdentitySession};

use crate::common::memory_session;

fn names(groups: &[Group]) -> Vec<&str> {
    groups.iter().map(Group::name).collect()
}

async fn organization(session: &IdentitySession) -> anyhow::Result<(Group, Group, Group)> {
    let persistence = session.persistence();
    let g1 = persistence.create_group("G1", "ORGANIZATION").await?;
    let g2 = persistence.create_group("G2", "ORGANIZATION_UNIT").await?;
    let g3 = persistence.create_group("G3", "ORGANIZATION_UNIT").await?;
    session.relationships().associate_groups(&g1, &[g2.clone(), g3.clone()]).await?;
    Ok((g1, g2, g3))
}

/// G1 holds G2 and G3; filtering children by type keeps or drops both.
#[tokio::test]
async fn test_children_filtered_by_type() -> anyhow::Result<()> {
    let (session, _) = memory_session(&["ORGANIZATION", "ORGANIZATION_UNIT", "DEPARTMENT"]);
    let (g1, g2, g3) = organization(&session).await?;
    let relationships = session.relationships();
    let criteria = SearchCriteria::new();

    let units = relationships
        .find_associated_groups(&g1, Direction::Children, Some("ORGANIZATION_UNIT"), false, &criteria)
        .await?;
    assert_eq!(units, vec![g2.clone(), g3.clone()]);

    let departments = relationships
        .find_associated_groups(&g1, Direction::Children, Some("DEPARTMENT"), false, &criteria)
        .await?;
    assert!(departments.is_empty());

    let parents = relationships
        .find_associated_groups(&g2, Direction::Parents, None, false, &criteria)
        .await?;
    assert_eq!(parents, vec![g1.clone()]);

    assert!(relationships.is_associated(&g1, &g3).await?);
    relationships.disassociate_group(&g1, &g3).await?;
    assert!(!relationships.is_associated(&g1, &g3).await?);
    Ok(())
}

/// Cascading through a membership cycle terminates and reports each group once.
#[tokio::test]
async fn test_cascade_through_cycle() -> anyhow::Result<()> {
    let (session, _) = memory_session(&["TEAM"]);
    let persistence = session.persistence();
    let a = persistence.create_group("A", "TEAM").await?;
    let b = persistence.create_group("B", "TEAM").await?;
    let c = persistence.create_group("C", "TEAM").await?;
    let relationships = session.relationships();
    relationships.associate_group(&a, &b).await?;
    relationships.associate_group(&b, &c).await?;
    relationships.associate_group(&c, &a).await?;

    let sorted = SearchCriteria::new().sorted(SortOrder::Ascending);
    let below = relationships
        .find_associated_groups(&a, Direction::Children, None, true, &sorted)
        .await?;
    assert_eq!(names(&below), ["A", "B", "C"]);

    let above = relationships
        .find_associated_groups(&b, Direction::Parents, None, true, &sorted)
        .await?;
    assert_eq!(names(&above), ["A", "B", "C"]);

    let direct = relationships
        .find_associated_groups(&a, Direction::Children, None, false, &sorted)
        .await?;
    assert_eq!(names(&direct), ["B"]);
    Ok(())
}

/// Users of a group, directly and through its subgroups.
#[tokio::test]
async fn test_users_cascade_through_subgroups() -> anyhow::Result<()> {
    let (session, _) = memory_session(&["ORGANIZATION", "ORGANIZATION_UNIT"]);
    let (g1, g2, g3) = organization(&session).await?;
    let persistence = session.persistence();
    let alice = persistence.create_user("alice").await?;
    let bob = persistence.create_user("bob").await?;
    let carol = persistence.create_user("carol").await?;

    let relationships = session.relationships();
    relationships.associate_user(&g1, &carol).await?;
    relationships.associate_user(&g2, &alice).await?;
    relationships.associate_user(&g3, &bob).await?;

    let criteria = SearchCriteria::new().sorted(SortOrder::Ascending);
    let direct = relationships.find_associated_users(&g1, false, &criteria).await?;
    assert_eq!(direct, vec![carol.clone()]);

    let all = relationships.find_related_users(&g1, &criteria).await?;
    assert_eq!(all, vec![alice.clone(), bob.clone(), carol.clone()]);

    let paged = relationships
        .find_related_users(&g1, &criteria.clone().paged(1, 1))
        .await?;
    assert_eq!(paged, vec![bob.clone()]);

    let groups = relationships
        .find_related_groups(&alice, None, &SearchCriteria::new().sorted(SortOrder::Ascending))
        .await?;
    assert_eq!(names(&groups), ["G1", "G2"]);

    let units = relationships
        .find_related_groups(&alice, Some("ORGANIZATION_UNIT"), &SearchCriteria::new())
        .await?;
    assert_eq!(units, vec![g2]);
    Ok(())
}

/// Every mutation is bracketed by a pre and a post event.
#[tokio::test]
async fn test_mutations_emit_event_pairs() -> anyhow::Result<()> {
    let (session, listener) = memory_session(&["ORGANIZATION", "ORGANIZATION_UNIT"]);
    let (g1, g2, _) = organization(&session).await?;
    session.relationships().disassociate_group(&g1, &g2).await?;

    let events = listener.events();
    // 3 groups, 2 associations, 1 removal
    assert_eq!(events.len(), 12);
    for pair in events.chunks(2) {
        assert_eq!(pair[0].phase, EventPhase::Pre);
        assert_eq!(pair[1].phase, EventPhase::Post);
        assert_eq!(pair[0].payload, pair[1].payload);
    }
    let relationship_events = events
        .iter()
        .filter(|e| e.category() == EventCategory::Relationship)
        .count();
    assert_eq!(relationship_events, 6);
    assert!(events.iter().all(|e| e.session_id == session.id()));
    Ok(())
}
