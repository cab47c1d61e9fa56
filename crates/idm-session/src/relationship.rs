//! Group and user memberships.

use idm_core::Result;
use idm_model::{
    Direction, Group, IdentityObject, IdentityObjectType, RelationshipKind, SearchCriteria, User,
};

use crate::event::{EventAction, EventPayload};
use crate::session::IdentitySession;

/// Manages membership edges between groups, and between groups and users.
#[derive(Debug, Clone, Copy)]
pub struct RelationshipManager<'s> {
    session: &'s IdentitySession,
}

impl<'s> RelationshipManager<'s> {
    pub(crate) const fn new(session: &'s IdentitySession) -> Self {
        Self { session }
    }

    // ========================================================================
    // Associations
    // ========================================================================

    /// Makes `member` a child group of `parent`.
    ///
    /// ## Errors
    ///
    /// Returns `NotFound` if either group is missing and
    /// `OperationNotSupported` if the store cannot hold the edge.
    pub async fn associate_group(&self, parent: &Group, member: &Group) -> Result<()> {
        let from = self.session.require_group(parent).await?;
        let to = self.session.require_group(member).await?;
        self.link(&from, &to, parent, member.key().to_string()).await
    }

    /// Makes every group of `members` a child group of `parent`.
    ///
    /// ## Errors
    ///
    /// Stops at the first failing association.
    pub async fn associate_groups(&self, parent: &Group, members: &[Group]) -> Result<()> {
        for member in members {
            self.associate_group(parent, member).await?;
        }
        Ok(())
    }

    /// Makes `user` a member of `parent`.
    ///
    /// ## Errors
    ///
    /// Returns `NotFound` if the group or user is missing.
    pub async fn associate_user(&self, parent: &Group, user: &User) -> Result<()> {
        let from = self.session.require_group(parent).await?;
        let to = self.session.require_user(user).await?;
        self.link(&from, &to, parent, user.id().to_string()).await
    }

    /// Makes every user of `users` a member of `parent`.
    ///
    /// ## Errors
    ///
    /// Stops at the first failing association.
    pub async fn associate_users(&self, parent: &Group, users: &[User]) -> Result<()> {
        for user in users {
            self.associate_user(parent, user).await?;
        }
        Ok(())
    }

    /// Removes `member` from the child groups of `parent`.
    ///
    /// Removing an edge that does not exist is not an error.
    ///
    /// ## Errors
    ///
    /// Returns `NotFound` if either group is missing.
    pub async fn disassociate_group(&self, parent: &Group, member: &Group) -> Result<()> {
        let from = self.session.require_group(parent).await?;
        let to = self.session.require_group(member).await?;
        self.unlink(&from, &to, parent, member.key().to_string()).await
    }

    /// Removes every group of `members` from the child groups of `parent`.
    ///
    /// ## Errors
    ///
    /// Stops at the first failure.
    pub async fn disassociate_groups(&self, parent: &Group, members: &[Group]) -> Result<()> {
        for member in members {
            self.disassociate_group(parent, member).await?;
        }
        Ok(())
    }

    /// Removes `user` from the members of `parent`.
    ///
    /// ## Errors
    ///
    /// Returns `NotFound` if the group or user is missing.
    pub async fn disassociate_user(&self, parent: &Group, user: &User) -> Result<()> {
        let from = self.session.require_group(parent).await?;
        let to = self.session.require_user(user).await?;
        self.unlink(&from, &to, parent, user.id().to_string()).await
    }

    /// Removes every user of `users` from the members of `parent`.
    ///
    /// ## Errors
    ///
    /// Stops at the first failure.
    pub async fn disassociate_users(&self, parent: &Group, users: &[User]) -> Result<()> {
        for user in users {
            self.disassociate_user(parent, user).await?;
        }
        Ok(())
    }

    /// Checks whether `member` is a direct child group of `parent`.
    ///
    /// Missing groups are reported as not associated.
    ///
    /// ## Errors
    ///
    /// Returns store failures.
    pub async fn is_associated(&self, parent: &Group, member: &Group) -> Result<bool> {
        let (Some(from), Some(to)) = (
            self.session.group_object(parent).await?,
            self.session.group_object(member).await?,
        ) else {
            return Ok(false);
        };
        self.has_membership(&from, &to).await
    }

    /// Checks whether `user` is a direct member of `parent`.
    ///
    /// ## Errors
    ///
    /// Returns store failures.
    pub async fn is_associated_user(&self, parent: &Group, user: &User) -> Result<bool> {
        let (Some(from), Some(to)) = (
            self.session.group_object(parent).await?,
            self.session.user_object(user).await?,
        ) else {
            return Ok(false);
        };
        self.has_membership(&from, &to).await
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    /// Finds the groups associated with a group.
    ///
    /// [`Direction::Children`] returns the groups `group` holds,
    /// [`Direction::Parents`] the groups holding it. With `cascade` the
    /// search continues transitively; `group_type` only filters the output.
    ///
    /// ## Errors
    ///
    /// Returns `UnsupportedCriterium` and store failures. A missing group
    /// yields an empty list.
    pub async fn find_associated_groups(
        &self,
        group: &Group,
        direction: Direction,
        group_type: Option<&str>,
        cascade: bool,
        criteria: &SearchCriteria,
    ) -> Result<Vec<Group>> {
        let Some(start) = self.session.group_object(group).await? else {
            return Ok(Vec::new());
        };
        let target = self.target_type(group_type);
        let resolver = self.session.resolver();

        let objects = if cascade {
            resolver
                .cascade_groups(&start, direction, target.as_ref(), criteria)
                .await?
        } else {
            resolver
                .groups(&start, direction, target.as_ref(), criteria)
                .await?
        };
        self.session.to_groups(&objects)
    }

    /// Finds the users of a group, optionally through its subgroups.
    ///
    /// ## Errors
    ///
    /// Returns `UnsupportedCriterium` and store failures.
    pub async fn find_associated_users(
        &self,
        group: &Group,
        cascade: bool,
        criteria: &SearchCriteria,
    ) -> Result<Vec<User>> {
        let Some(start) = self.session.group_object(group).await? else {
            return Ok(Vec::new());
        };
        let objects = self
            .session
            .resolver()
            .users_of(&start, cascade, criteria)
            .await?;
        self.session.to_users(&objects)
    }

    /// Finds the users of a group and of every group below it.
    ///
    /// ## Errors
    ///
    /// Returns `UnsupportedCriterium` and store failures.
    pub async fn find_related_users(&self, group: &Group, criteria: &SearchCriteria) -> Result<Vec<User>> {
        self.find_associated_users(group, true, criteria).await
    }

    /// Finds the groups a user is a direct member of.
    ///
    /// ## Errors
    ///
    /// Returns `UnsupportedCriterium` and store failures.
    pub async fn find_groups_of_user(
        &self,
        user: &User,
        group_type: Option<&str>,
        criteria: &SearchCriteria,
    ) -> Result<Vec<Group>> {
        self.groups_of(user, group_type, false, criteria).await
    }

    /// Finds the groups a user belongs to directly or through group
    /// nesting.
    ///
    /// ## Errors
    ///
    /// Returns `UnsupportedCriterium` and store failures.
    pub async fn find_related_groups(
        &self,
        user: &User,
        group_type: Option<&str>,
        criteria: &SearchCriteria,
    ) -> Result<Vec<Group>> {
        self.groups_of(user, group_type, true, criteria).await
    }

    async fn groups_of(
        &self,
        user: &User,
        group_type: Option<&str>,
        cascade: bool,
        criteria: &SearchCriteria,
    ) -> Result<Vec<Group>> {
        let Some(start) = self.session.user_object(user).await? else {
            return Ok(Vec::new());
        };
        let target = self.target_type(group_type);
        let objects = self
            .session
            .resolver()
            .groups_of(&start, target.as_ref(), cascade, criteria)
            .await?;
        self.session.to_groups(&objects)
    }

    fn target_type(&self, group_type: Option<&str>) -> Option<IdentityObjectType> {
        group_type.map(|t| self.session.group_identity_type(t))
    }

    async fn has_membership(&self, from: &IdentityObject, to: &IdentityObject) -> Result<bool> {
        let edges = self
            .session
            .store()
            .resolve_relationships(from, to, Some(RelationshipKind::Member))
            .await?;
        Ok(!edges.is_empty())
    }

    async fn link(
        &self,
        from: &IdentityObject,
        to: &IdentityObject,
        parent: &Group,
        member: String,
    ) -> Result<()> {
        let store = self.session.store();
        store
            .features()
            .check_relationship(&from.object_type, &to.object_type, RelationshipKind::Member)?;

        let payload = EventPayload::relationship(
            EventAction::Created,
            RelationshipKind::Member,
            parent.key().to_string(),
            member,
            None,
        );
        self.session
            .bracket(
                payload,
                store.create_relationship(from, to, RelationshipKind::Member, None, false),
            )
            .await?;

        tracing::debug!(parent = %from.name, member = %to.name, "Associated member");
        Ok(())
    }

    async fn unlink(
        &self,
        from: &IdentityObject,
        to: &IdentityObject,
        parent: &Group,
        member: String,
    ) -> Result<()> {
        let payload = EventPayload::relationship(
            EventAction::Removed,
            RelationshipKind::Member,
            parent.key().to_string(),
            member,
            None,
        );
        self.session
            .bracket(
                payload,
                self.session
                    .store()
                    .remove_relationship(from, to, RelationshipKind::Member, None),
            )
            .await?;

        tracing::debug!(parent = %from.name, member = %to.name, "Disassociated member");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use idm_core::{Error, IdentityConfig};
    use idm_model::SortOrder;
    use idm_store::{FeaturesDescription, IdentityStore, MemoryIdentityStore};

    use super::*;
    use crate::event::{EventCategory, InMemoryEventListener};

    fn session() -> IdentitySession {
        let store = MemoryIdentityStore::for_types("mem", "USER", &["ORG", "OU"]);
        IdentitySession::new(Arc::new(store), IdentityConfig::default())
    }

    fn names(groups: &[Group]) -> Vec<&str> {
        let mut names: Vec<&str> = groups.iter().map(Group::name).collect();
        names.sort_unstable();
        names
    }

    #[tokio::test]
    async fn child_groups_filtered_by_type() {
        let session = session();
        let persistence = session.persistence();
        let relationships = session.relationships();

        let g1 = persistence.create_group("G1", "ORG").await.unwrap();
        let g2 = persistence.create_group("G2", "OU").await.unwrap();
        let g3 = persistence.create_group("G3", "OU").await.unwrap();
        relationships
            .associate_groups(&g1, &[g2.clone(), g3.clone()])
            .await
            .unwrap();

        let none = SearchCriteria::new();
        let children = relationships
            .find_associated_groups(&g1, Direction::Children, None, false, &none)
            .await
            .unwrap();
        assert_eq!(names(&children), ["G2", "G3"]);

        let ou = relationships
            .find_associated_groups(&g1, Direction::Children, Some("OU"), false, &none)
            .await
            .unwrap();
        assert_eq!(names(&ou), ["G2", "G3"]);

        let parents = relationships
            .find_associated_groups(&g2, Direction::Parents, None, false, &none)
            .await
            .unwrap();
        assert_eq!(parents, [g1.clone()]);

        assert!(relationships.is_associated(&g1, &g2).await.unwrap());
        assert!(!relationships.is_associated(&g2, &g1).await.unwrap());

        relationships.disassociate_group(&g1, &g2).await.unwrap();
        assert!(!relationships.is_associated(&g1, &g2).await.unwrap());
    }

    #[tokio::test]
    async fn users_directly_and_transitively() {
        let session = session();
        let persistence = session.persistence();
        let relationships = session.relationships();

        let org = persistence.create_group("acme", "ORG").await.unwrap();
        let ou = persistence.create_group("sales", "OU").await.unwrap();
        let alice = persistence.create_user("alice").await.unwrap();
        let bob = persistence.create_user("bob").await.unwrap();
        relationships.associate_group(&org, &ou).await.unwrap();
        relationships.associate_user(&org, &alice).await.unwrap();
        relationships.associate_user(&ou, &bob).await.unwrap();

        let none = SearchCriteria::new();
        let direct = relationships
            .find_associated_users(&org, false, &none)
            .await
            .unwrap();
        assert_eq!(direct, [alice.clone()]);

        let sorted = SearchCriteria::new().sorted(SortOrder::Descending);
        let related = relationships.find_related_users(&org, &sorted).await.unwrap();
        assert_eq!(related, [bob.clone(), alice.clone()]);

        let bobs = relationships
            .find_groups_of_user(&bob, None, &none)
            .await
            .unwrap();
        assert_eq!(bobs, [ou.clone()]);
        let bobs_all = relationships
            .find_related_groups(&bob, None, &none)
            .await
            .unwrap();
        assert_eq!(names(&bobs_all), ["acme", "sales"]);
        let bobs_orgs = relationships
            .find_related_groups(&bob, Some("ORG"), &none)
            .await
            .unwrap();
        assert_eq!(bobs_orgs, [org.clone()]);

        assert!(relationships.is_associated_user(&ou, &bob).await.unwrap());
        relationships.disassociate_users(&ou, &[bob.clone()]).await.unwrap();
        assert!(!relationships.is_associated_user(&ou, &bob).await.unwrap());
    }

    #[tokio::test]
    async fn unsupported_edges_fail_before_events() {
        let features = FeaturesDescription::builder()
            .identity_type("USER", [])
            .identity_type("OU", [])
            .build();
        let store: Arc<dyn IdentityStore> = Arc::new(MemoryIdentityStore::new("strict", features));
        let recorder = Arc::new(InMemoryEventListener::only(&[EventCategory::Relationship]));
        let session =
            IdentitySession::new(store, IdentityConfig::default()).with_listener(recorder.clone());

        let ou = session.persistence().create_group("sales", "OU").await.unwrap();
        let alice = session.persistence().create_user("alice").await.unwrap();
        let err = session
            .relationships()
            .associate_user(&ou, &alice)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::OperationNotSupported(_)));
        assert!(recorder.events().is_empty());

        let missing = Group::new("ghost", "OU").unwrap();
        assert!(matches!(
            session.relationships().associate_user(&missing, &alice).await,
            Err(Error::NotFound(_))
        ));
        assert!(session
            .relationships()
            .find_associated_users(&missing, true, &SearchCriteria::new())
            .await
            .unwrap()
            .is_empty());
    }
}
