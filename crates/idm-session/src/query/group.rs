//! Group queries.

use async_trait::async_trait;
use idm_core::error::require_non_blank;
use idm_core::{QueryError, Result};
use idm_model::{Direction, Group, GroupKey, SearchCriteria, User};

use super::{
    finish_merge, push_unique, pushed_criteria, Dimension, DimensionMerge, DimensionResolver,
    Query, QueryBuilder,
};
use crate::attribute::Subject;
use crate::session::IdentitySession;

/// Accumulates the dimensions of a [`GroupQuery`].
#[derive(Debug, Clone, Default)]
pub struct GroupQueryBuilder {
    key: Option<GroupKey>,
    group: Option<Group>,
    parent_groups: Vec<Group>,
    child_groups: Vec<Group>,
    associated_users: Vec<User>,
    related_users: Vec<User>,
    role_users: Vec<User>,
    group_type: Option<String>,
    criteria: SearchCriteria,
}

impl GroupQueryBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the result to the group with this key.
    pub fn key(&mut self, key: GroupKey) -> &mut Self {
        self.key = Some(key);
        self
    }

    /// Restricts the result to the group with this key text.
    ///
    /// ## Errors
    ///
    /// Returns `IllegalArgument` for a malformed key.
    pub fn key_str(&mut self, key: &str) -> Result<&mut Self> {
        Ok(self.key(key.parse()?))
    }

    /// Restricts the result to one group, looked up by name and type.
    pub fn group(&mut self, group: Group) -> &mut Self {
        self.group = Some(group);
        self
    }

    /// Restricts the result to the group with this name and type.
    ///
    /// ## Errors
    ///
    /// Returns `IllegalArgument` for blank or reserved values.
    pub fn name_and_type(&mut self, name: &str, group_type: &str) -> Result<&mut Self> {
        Ok(self.group(Group::new(name, group_type)?))
    }

    /// Keeps groups that are children of `parent`.
    pub fn add_parent_group(&mut self, parent: Group) -> &mut Self {
        push_unique(&mut self.parent_groups, parent);
        self
    }

    /// Keeps groups that are children of any of these groups.
    pub fn add_parent_groups(&mut self, parents: impl IntoIterator<Item = Group>) -> &mut Self {
        for parent in parents {
            self.add_parent_group(parent);
        }
        self
    }

    /// Keeps groups that are parents of `child`.
    pub fn add_child_group(&mut self, child: Group) -> &mut Self {
        push_unique(&mut self.child_groups, child);
        self
    }

    /// Keeps groups that are parents of any of these groups.
    pub fn add_child_groups(&mut self, children: impl IntoIterator<Item = Group>) -> &mut Self {
        for child in children {
            self.add_child_group(child);
        }
        self
    }

    /// Keeps groups holding `user` directly.
    pub fn add_associated_user(&mut self, user: User) -> &mut Self {
        push_unique(&mut self.associated_users, user);
        self
    }

    /// Keeps groups holding any of these users directly.
    pub fn add_associated_users(&mut self, users: impl IntoIterator<Item = User>) -> &mut Self {
        for user in users {
            self.add_associated_user(user);
        }
        self
    }

    /// Keeps groups holding the user with this id directly.
    ///
    /// ## Errors
    ///
    /// Returns `IllegalArgument` for a blank id.
    pub fn add_associated_user_id(&mut self, id: &str) -> Result<&mut Self> {
        Ok(self.add_associated_user(User::new(id)?))
    }

    /// Keeps groups holding `user` directly or through subgroups.
    pub fn add_related_user(&mut self, user: User) -> &mut Self {
        push_unique(&mut self.related_users, user);
        self
    }

    /// Keeps groups related to any of these users.
    pub fn add_related_users(&mut self, users: impl IntoIterator<Item = User>) -> &mut Self {
        for user in users {
            self.add_related_user(user);
        }
        self
    }

    /// Keeps groups related to the user with this id.
    ///
    /// ## Errors
    ///
    /// Returns `IllegalArgument` for a blank id.
    pub fn add_related_user_id(&mut self, id: &str) -> Result<&mut Self> {
        Ok(self.add_related_user(User::new(id)?))
    }

    /// Keeps groups in which `user` holds any role.
    pub fn add_role_user(&mut self, user: User) -> &mut Self {
        push_unique(&mut self.role_users, user);
        self
    }

    /// Keeps groups in which any of these users holds a role.
    pub fn add_role_users(&mut self, users: impl IntoIterator<Item = User>) -> &mut Self {
        for user in users {
            self.add_role_user(user);
        }
        self
    }

    /// Keeps groups in which the user with this id holds any role.
    ///
    /// ## Errors
    ///
    /// Returns `IllegalArgument` for a blank id.
    pub fn add_role_user_id(&mut self, id: &str) -> Result<&mut Self> {
        Ok(self.add_role_user(User::new(id)?))
    }

    /// Keeps groups of one type. Alone, lists every group of the type.
    ///
    /// ## Errors
    ///
    /// Returns `IllegalArgument` for a blank type.
    pub fn group_type(&mut self, group_type: &str) -> Result<&mut Self> {
        require_non_blank(group_type, "group type")?;
        self.group_type = Some(group_type.to_string());
        Ok(self)
    }

    /// Clears every dimension and criterium.
    pub fn reset(&mut self) -> &mut Self {
        *self = Self::default();
        self
    }

    /// Snapshots the builder into a query.
    #[must_use]
    pub fn create_query(&self) -> GroupQuery {
        GroupQuery {
            key: self.key.clone(),
            group: self.group.clone(),
            parent_groups: self.parent_groups.clone(),
            child_groups: self.child_groups.clone(),
            associated_users: self.associated_users.clone(),
            related_users: self.related_users.clone(),
            role_users: self.role_users.clone(),
            group_type: self.group_type.clone(),
            criteria: self.criteria.clone(),
        }
    }
}

impl QueryBuilder for GroupQueryBuilder {
    fn criteria_mut(&mut self) -> &mut SearchCriteria {
        &mut self.criteria
    }
}

/// Immutable group query.
///
/// A group query needs at least one dimension or a group type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupQuery {
    key: Option<GroupKey>,
    group: Option<Group>,
    parent_groups: Vec<Group>,
    child_groups: Vec<Group>,
    associated_users: Vec<User>,
    related_users: Vec<User>,
    role_users: Vec<User>,
    group_type: Option<String>,
    criteria: SearchCriteria,
}

impl GroupQuery {
    /// Returns the key dimension.
    #[must_use]
    pub const fn key(&self) -> Option<&GroupKey> {
        self.key.as_ref()
    }

    /// Returns the group type modifier.
    #[must_use]
    pub fn group_type(&self) -> Option<&str> {
        self.group_type.as_deref()
    }

    /// Returns the criteria.
    #[must_use]
    pub const fn criteria(&self) -> &SearchCriteria {
        &self.criteria
    }

    fn populated(&self) -> usize {
        [
            self.key.is_some(),
            self.group.is_some(),
            !self.parent_groups.is_empty(),
            !self.child_groups.is_empty(),
            !self.associated_users.is_empty(),
            !self.related_users.is_empty(),
            !self.role_users.is_empty(),
        ]
        .into_iter()
        .filter(|p| *p)
        .count()
    }
}

#[async_trait]
impl Query for GroupQuery {
    type Item = Group;

    async fn execute(&self, session: &IdentitySession) -> Result<Vec<Group>> {
        let store = session.store();
        let target = self
            .group_type
            .as_deref()
            .map(|t| session.group_identity_type(t));
        if let Some(target) = &target {
            store.features().check_criteria(target, &self.criteria)?;
        }

        let populated = self.populated();
        if populated == 0 {
            let Some(target) = &target else {
                return Err(QueryError::NotEnoughInformation.into());
            };
            let all = store.find_identity_objects(target, &self.criteria).await?;
            return session.to_groups(&all);
        }

        let pushed = pushed_criteria(populated, &self.criteria);
        let dimensions = DimensionResolver::new(session, target);
        let mut merge = DimensionMerge::new();

        if let Some(key) = &self.key {
            let found = session.group_object(&key.to_group()).await?;
            merge.add(dimensions.lookup(found, &pushed).await?);
        }
        if let Some(group) = &self.group {
            let found = session.group_object(group).await?;
            merge.add(dimensions.lookup(found, &pushed).await?);
        }

        let group_dimensions = [
            (Dimension::GroupsAround(Direction::Children), &self.parent_groups),
            (Dimension::GroupsAround(Direction::Parents), &self.child_groups),
        ];
        for (dimension, groups) in group_dimensions {
            if !groups.is_empty() {
                let seeds: Vec<Subject<'_>> = groups.iter().map(Subject::from).collect();
                merge.add(dimensions.resolve(dimension, &seeds, &pushed).await?);
            }
        }

        let user_dimensions = [
            (Dimension::GroupsOf { cascade: false }, &self.associated_users),
            (Dimension::GroupsOf { cascade: true }, &self.related_users),
            (Dimension::RoleGroupsOf, &self.role_users),
        ];
        for (dimension, users) in user_dimensions {
            if !users.is_empty() {
                let seeds: Vec<Subject<'_>> = users.iter().map(Subject::from).collect();
                merge.add(dimensions.resolve(dimension, &seeds, &pushed).await?);
            }
        }

        let groups = finish_merge(session, merge, populated, &self.criteria).await?;
        tracing::trace!(dimensions = populated, results = groups.len(), "Resolved group query");
        session.to_groups(&groups)
    }
}
