//! Role types and roles.
//!
//! A role is a named `ROLE` edge from a group to a user; the edge name is the
//! role type. Role types are the store's relationship names.

use std::collections::BTreeMap;

use idm_core::error::require_non_blank;
use idm_core::Result;
use idm_model::{
    Direction, Group, IdentityObject, IdentityObjectType, RelationshipKind, Role, RoleType,
    SearchCriteria, User,
};

use crate::criteria::{apply_to_names, apply_to_roles, CriteriaApplier};
use crate::event::{EventAction, EventPayload};
use crate::session::IdentitySession;

/// Manages role types and the roles connecting users to groups.
#[derive(Debug, Clone, Copy)]
pub struct RoleManager<'s> {
    session: &'s IdentitySession,
}

impl<'s> RoleManager<'s> {
    pub(crate) const fn new(session: &'s IdentitySession) -> Self {
        Self { session }
    }

    // ========================================================================
    // Role types
    // ========================================================================

    /// Creates a role type.
    ///
    /// ## Errors
    ///
    /// Returns `OperationNotSupported` if the store has no named
    /// relationships and `AlreadyExists` for duplicates.
    pub async fn create_role_type(&self, name: &str) -> Result<RoleType> {
        let role_type = RoleType::new(name)?;
        let store = self.session.store();
        store.features().check_named_relationships()?;

        let payload = EventPayload::role_type(EventAction::Created, role_type.name());
        self.session
            .bracket(payload, store.create_relationship_name(role_type.name()))
            .await?;

        tracing::debug!(role_type = role_type.name(), "Created role type");
        Ok(role_type)
    }

    /// Removes a role type and every role of that type.
    ///
    /// ## Errors
    ///
    /// Returns `NotFound` if the role type does not exist.
    pub async fn remove_role_type(&self, role_type: &RoleType) -> Result<()> {
        let store = self.session.store();
        store.features().check_named_relationships()?;

        let payload = EventPayload::role_type(EventAction::Removed, role_type.name());
        self.session
            .bracket(payload, store.remove_relationship_name(role_type.name()))
            .await?;

        tracing::debug!(role_type = role_type.name(), "Removed role type");
        Ok(())
    }

    /// Finds a role type by name.
    ///
    /// ## Errors
    ///
    /// Returns `IllegalArgument` for a blank name and
    /// `OperationNotSupported` if the store has no named relationships.
    pub async fn get_role_type(&self, name: &str) -> Result<Option<RoleType>> {
        require_non_blank(name, "role type name")?;
        let names = self.all_role_type_names().await?;
        names
            .into_iter()
            .find(|n| n == name)
            .map(RoleType::new)
            .transpose()
    }

    /// Lists role types matching criteria.
    ///
    /// ## Errors
    ///
    /// Returns `OperationNotSupported` if the store has no named
    /// relationships.
    pub async fn find_role_types(&self, criteria: &SearchCriteria) -> Result<Vec<RoleType>> {
        self.session.store().features().check_named_relationships()?;
        let names = self.session.store().relationship_names(criteria).await?;
        names.into_iter().map(RoleType::new).collect()
    }

    /// Counts role types.
    ///
    /// ## Errors
    ///
    /// Returns `OperationNotSupported` if the store has no named
    /// relationships.
    pub async fn role_type_count(&self) -> Result<usize> {
        Ok(self.all_role_type_names().await?.len())
    }

    /// Lists the role types a user holds in a group.
    ///
    /// ## Errors
    ///
    /// Returns store failures. Missing identities yield an empty list.
    pub async fn find_role_types_of(
        &self,
        user: &User,
        group: &Group,
        criteria: &SearchCriteria,
    ) -> Result<Vec<RoleType>> {
        let Some((group_object, user_object)) = self.pair(group, user).await? else {
            return Ok(Vec::new());
        };
        let names = self.role_names_between(&group_object, &user_object).await?;
        apply_to_names(names, criteria)
            .into_iter()
            .map(RoleType::new)
            .collect()
    }

    /// Lists the role types a user holds in any group.
    ///
    /// ## Errors
    ///
    /// Returns store failures.
    pub async fn find_role_types_of_user(
        &self,
        user: &User,
        criteria: &SearchCriteria,
    ) -> Result<Vec<RoleType>> {
        let Some(object) = self.session.user_object(user).await? else {
            return Ok(Vec::new());
        };
        self.role_types_of(&object, criteria).await
    }

    /// Lists the role types held by anyone in a group.
    ///
    /// ## Errors
    ///
    /// Returns store failures.
    pub async fn find_role_types_of_group(
        &self,
        group: &Group,
        criteria: &SearchCriteria,
    ) -> Result<Vec<RoleType>> {
        let Some(object) = self.session.group_object(group).await? else {
            return Ok(Vec::new());
        };
        self.role_types_of(&object, criteria).await
    }

    /// Returns the properties of a role type.
    ///
    /// ## Errors
    ///
    /// Returns `OperationNotSupported` on stores without relationship name
    /// properties.
    pub async fn role_type_properties(&self, role_type: &RoleType) -> Result<BTreeMap<String, String>> {
        self.session
            .store()
            .relationship_name_properties(role_type.name())
            .await
    }

    /// Replaces the properties of a role type.
    ///
    /// ## Errors
    ///
    /// Returns `OperationNotSupported` on stores without relationship name
    /// properties.
    pub async fn set_role_type_properties(
        &self,
        role_type: &RoleType,
        properties: &BTreeMap<String, String>,
    ) -> Result<()> {
        let payload = EventPayload::role_type(EventAction::Updated, role_type.name());
        self.session
            .bracket(
                payload,
                self.session
                    .store()
                    .set_relationship_name_properties(role_type.name(), properties),
            )
            .await
    }

    // ========================================================================
    // Roles
    // ========================================================================

    /// Grants a role: `user` holds `role_type` in `group`.
    ///
    /// ## Errors
    ///
    /// Returns `NotFound` if an identity or the role type is missing and
    /// `OperationNotSupported` if the store cannot hold role edges.
    pub async fn create_role(&self, role_type: &RoleType, user: &User, group: &Group) -> Result<Role> {
        let group_object = self.session.require_group(group).await?;
        let user_object = self.session.require_user(user).await?;
        let store = self.session.store();
        store.features().check_relationship(
            &group_object.object_type,
            &user_object.object_type,
            RelationshipKind::Role,
        )?;
        store.features().check_named_relationships()?;

        let payload = EventPayload::relationship(
            EventAction::Created,
            RelationshipKind::Role,
            group.key().to_string(),
            user.id(),
            Some(role_type.name()),
        );
        self.session
            .bracket(
                payload,
                store.create_relationship(
                    &group_object,
                    &user_object,
                    RelationshipKind::Role,
                    Some(role_type.name()),
                    false,
                ),
            )
            .await?;

        tracing::debug!(role_type = role_type.name(), user = user.id(), group = %group.key(), "Created role");
        Ok(Role::new(role_type.clone(), user.clone(), group.clone()))
    }

    /// Revokes a role. Revoking a role that is not held is not an error.
    ///
    /// ## Errors
    ///
    /// Returns `NotFound` if the user or group is missing.
    pub async fn remove_role(&self, role: &Role) -> Result<()> {
        let group_object = self.session.require_group(role.group()).await?;
        let user_object = self.session.require_user(role.user()).await?;

        let payload = EventPayload::relationship(
            EventAction::Removed,
            RelationshipKind::Role,
            role.group().key().to_string(),
            role.user().id(),
            Some(role.role_type().name()),
        );
        self.session
            .bracket(
                payload,
                self.session.store().remove_relationship(
                    &group_object,
                    &user_object,
                    RelationshipKind::Role,
                    Some(role.role_type().name()),
                ),
            )
            .await?;

        tracing::debug!(role_type = role.role_type().name(), user = role.user().id(), "Removed role");
        Ok(())
    }

    /// Checks whether `user` holds `role_type` in `group`.
    ///
    /// ## Errors
    ///
    /// Returns store failures.
    pub async fn has_role(&self, user: &User, group: &Group, role_type: &RoleType) -> Result<bool> {
        let Some((group_object, user_object)) = self.pair(group, user).await? else {
            return Ok(false);
        };
        let names = self.role_names_between(&group_object, &user_object).await?;
        Ok(names.iter().any(|n| n == role_type.name()))
    }

    /// Returns the role if `user` holds `role_type` in `group`.
    ///
    /// ## Errors
    ///
    /// Returns store failures.
    pub async fn get_role(&self, role_type: &RoleType, user: &User, group: &Group) -> Result<Option<Role>> {
        if self.has_role(user, group, role_type).await? {
            Ok(Some(Role::new(role_type.clone(), user.clone(), group.clone())))
        } else {
            Ok(None)
        }
    }

    /// Lists the roles of a user, optionally of one type.
    ///
    /// ## Errors
    ///
    /// Returns store failures.
    pub async fn find_roles_of_user(&self, user: &User, role_type: Option<&RoleType>) -> Result<Vec<Role>> {
        let Some(user_object) = self.session.user_object(user).await? else {
            return Ok(Vec::new());
        };
        let groups = self
            .role_neighbours(&user_object, Direction::Parents, None, &SearchCriteria::default())
            .await?;

        let mut roles = Vec::new();
        for group_object in &groups {
            let group = self.session.to_group(group_object)?;
            for name in self.role_names_between(group_object, &user_object).await? {
                if role_type.map_or(true, |rt| rt.name() == name) {
                    roles.push(Role::new(RoleType::new(name)?, user.clone(), group.clone()));
                }
            }
        }
        Ok(roles)
    }

    /// Lists the roles held in a group, optionally of one type.
    ///
    /// ## Errors
    ///
    /// Returns store failures.
    pub async fn find_roles_of_group(&self, group: &Group, role_type: Option<&RoleType>) -> Result<Vec<Role>> {
        let Some(group_object) = self.session.group_object(group).await? else {
            return Ok(Vec::new());
        };
        let user_type = self.session.user_type().clone();
        let users = self
            .role_neighbours(
                &group_object,
                Direction::Children,
                Some(&user_type),
                &SearchCriteria::default(),
            )
            .await?;

        let mut roles = Vec::new();
        for user_object in &users {
            let user = self.session.to_user(user_object)?;
            for name in self.role_names_between(&group_object, user_object).await? {
                if role_type.map_or(true, |rt| rt.name() == name) {
                    roles.push(Role::new(RoleType::new(name)?, user.clone(), group.clone()));
                }
            }
        }
        Ok(roles)
    }

    /// Lists every role matching criteria on the role type name.
    ///
    /// ## Errors
    ///
    /// Returns store failures.
    pub async fn find_roles(
        &self,
        user: &User,
        role_type: Option<&RoleType>,
        criteria: &SearchCriteria,
    ) -> Result<Vec<Role>> {
        let roles = self.find_roles_of_user(user, role_type).await?;
        Ok(apply_to_roles(roles, criteria))
    }

    /// Finds the users holding any role in a group.
    ///
    /// ## Errors
    ///
    /// Returns `UnsupportedCriterium` and store failures.
    pub async fn find_users_with_related_role(
        &self,
        group: &Group,
        criteria: &SearchCriteria,
    ) -> Result<Vec<User>> {
        let Some(group_object) = self.session.group_object(group).await? else {
            return Ok(Vec::new());
        };
        let user_type = self.session.user_type().clone();
        let users = self
            .role_neighbours(&group_object, Direction::Children, Some(&user_type), criteria)
            .await?;
        self.session.to_users(&users)
    }

    /// Finds the groups in which a user holds any role.
    ///
    /// ## Errors
    ///
    /// Returns `UnsupportedCriterium` and store failures.
    pub async fn find_groups_with_related_role(
        &self,
        user: &User,
        group_type: Option<&str>,
        criteria: &SearchCriteria,
    ) -> Result<Vec<Group>> {
        let Some(user_object) = self.session.user_object(user).await? else {
            return Ok(Vec::new());
        };
        let target = group_type.map(|t| self.session.group_identity_type(t));
        let groups = self
            .role_neighbours(&user_object, Direction::Parents, target.as_ref(), criteria)
            .await?;
        self.session.to_groups(&groups)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    pub(crate) async fn role_neighbours(
        &self,
        start: &IdentityObject,
        direction: Direction,
        target_type: Option<&IdentityObjectType>,
        criteria: &SearchCriteria,
    ) -> Result<Vec<IdentityObject>> {
        let store = self.session.store();
        if !store.features().is_relationship_kind_supported(RelationshipKind::Role) {
            return Err(idm_core::Error::not_supported(format!(
                "role relationships on store '{}'",
                store.id()
            )));
        }

        match target_type {
            Some(_) => {
                store
                    .find_related_identity_objects(start, RelationshipKind::Role, direction, target_type, criteria)
                    .await
            }
            None => {
                let related = store
                    .find_related_identity_objects(
                        start,
                        RelationshipKind::Role,
                        direction,
                        None,
                        &SearchCriteria::default(),
                    )
                    .await?;
                CriteriaApplier::new(store).apply(related, criteria).await
            }
        }
    }

    async fn pair(&self, group: &Group, user: &User) -> Result<Option<(IdentityObject, IdentityObject)>> {
        let group_object = self.session.group_object(group).await?;
        let user_object = self.session.user_object(user).await?;
        Ok(group_object.zip(user_object))
    }

    async fn role_names_between(&self, group: &IdentityObject, user: &IdentityObject) -> Result<Vec<String>> {
        let edges = self
            .session
            .store()
            .resolve_relationships(group, user, Some(RelationshipKind::Role))
            .await?;
        let mut names: Vec<String> = Vec::new();
        for name in edges.into_iter().filter_map(|e| e.name) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        Ok(names)
    }

    async fn role_types_of(&self, object: &IdentityObject, criteria: &SearchCriteria) -> Result<Vec<RoleType>> {
        self.session.store().features().check_named_relationships()?;
        let names = self
            .session
            .store()
            .relationship_names_of(object, criteria)
            .await?;
        names.into_iter().map(RoleType::new).collect()
    }

    async fn all_role_type_names(&self) -> Result<Vec<String>> {
        self.session.store().features().check_named_relationships()?;
        self.session
            .store()
            .relationship_names(&SearchCriteria::default())
            .await
    }
}
