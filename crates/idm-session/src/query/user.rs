//! User queries.

use async_trait::async_trait;
use idm_core::Result;
use idm_model::{Group, GroupKey, SearchCriteria, User};

use super::{
    finish_merge, push_unique, pushed_criteria, Dimension, DimensionMerge, DimensionResolver,
    Query, QueryBuilder,
};
use crate::attribute::Subject;
use crate::session::IdentitySession;

/// Accumulates the dimensions of a [`UserQuery`].
#[derive(Debug, Clone, Default)]
pub struct UserQueryBuilder {
    user: Option<User>,
    associated_groups: Vec<Group>,
    related_groups: Vec<Group>,
    role_groups: Vec<Group>,
    criteria: SearchCriteria,
}

impl UserQueryBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the result to one user.
    pub fn user(&mut self, user: User) -> &mut Self {
        self.user = Some(user);
        self
    }

    /// Restricts the result to the user with this id.
    ///
    /// ## Errors
    ///
    /// Returns `IllegalArgument` for a blank id.
    pub fn user_id(&mut self, id: &str) -> Result<&mut Self> {
        Ok(self.user(User::new(id)?))
    }

    /// Keeps users that are direct members of a group.
    pub fn add_associated_group(&mut self, group: Group) -> &mut Self {
        push_unique(&mut self.associated_groups, group);
        self
    }

    /// Keeps users that are direct members of any of these groups.
    pub fn add_associated_groups(&mut self, groups: impl IntoIterator<Item = Group>) -> &mut Self {
        for group in groups {
            self.add_associated_group(group);
        }
        self
    }

    /// Keeps users that are direct members of the group with this key.
    ///
    /// ## Errors
    ///
    /// Returns `IllegalArgument` for a malformed key.
    pub fn add_associated_group_key(&mut self, key: &str) -> Result<&mut Self> {
        let key: GroupKey = key.parse()?;
        Ok(self.add_associated_group(key.to_group()))
    }

    /// Keeps users that belong to a group directly or through subgroups.
    pub fn add_related_group(&mut self, group: Group) -> &mut Self {
        push_unique(&mut self.related_groups, group);
        self
    }

    /// Keeps users related to any of these groups.
    pub fn add_related_groups(&mut self, groups: impl IntoIterator<Item = Group>) -> &mut Self {
        for group in groups {
            self.add_related_group(group);
        }
        self
    }

    /// Keeps users related to the group with this key.
    ///
    /// ## Errors
    ///
    /// Returns `IllegalArgument` for a malformed key.
    pub fn add_related_group_key(&mut self, key: &str) -> Result<&mut Self> {
        let key: GroupKey = key.parse()?;
        Ok(self.add_related_group(key.to_group()))
    }

    /// Keeps users holding any role in a group.
    pub fn add_role_group(&mut self, group: Group) -> &mut Self {
        push_unique(&mut self.role_groups, group);
        self
    }

    /// Keeps users holding any role in any of these groups.
    pub fn add_role_groups(&mut self, groups: impl IntoIterator<Item = Group>) -> &mut Self {
        for group in groups {
            self.add_role_group(group);
        }
        self
    }

    /// Keeps users holding any role in the group with this key.
    ///
    /// ## Errors
    ///
    /// Returns `IllegalArgument` for a malformed key.
    pub fn add_role_group_key(&mut self, key: &str) -> Result<&mut Self> {
        let key: GroupKey = key.parse()?;
        Ok(self.add_role_group(key.to_group()))
    }

    /// Clears every dimension and criterium.
    pub fn reset(&mut self) -> &mut Self {
        *self = Self::default();
        self
    }

    /// Snapshots the builder into a query.
    #[must_use]
    pub fn create_query(&self) -> UserQuery {
        UserQuery {
            user: self.user.clone(),
            associated_groups: self.associated_groups.clone(),
            related_groups: self.related_groups.clone(),
            role_groups: self.role_groups.clone(),
            criteria: self.criteria.clone(),
        }
    }
}

impl QueryBuilder for UserQueryBuilder {
    fn criteria_mut(&mut self) -> &mut SearchCriteria {
        &mut self.criteria
    }
}

/// Immutable user query.
///
/// Without any dimension every user matching the criteria is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserQuery {
    user: Option<User>,
    associated_groups: Vec<Group>,
    related_groups: Vec<Group>,
    role_groups: Vec<Group>,
    criteria: SearchCriteria,
}

impl UserQuery {
    /// Returns the user dimension.
    #[must_use]
    pub const fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// Returns the direct membership dimension.
    #[must_use]
    pub fn associated_groups(&self) -> &[Group] {
        &self.associated_groups
    }

    /// Returns the transitive membership dimension.
    #[must_use]
    pub fn related_groups(&self) -> &[Group] {
        &self.related_groups
    }

    /// Returns the role dimension.
    #[must_use]
    pub fn role_groups(&self) -> &[Group] {
        &self.role_groups
    }

    /// Returns the criteria.
    #[must_use]
    pub const fn criteria(&self) -> &SearchCriteria {
        &self.criteria
    }

    fn populated(&self) -> usize {
        [
            self.user.is_some(),
            !self.associated_groups.is_empty(),
            !self.related_groups.is_empty(),
            !self.role_groups.is_empty(),
        ]
        .into_iter()
        .filter(|p| *p)
        .count()
    }
}

#[async_trait]
impl Query for UserQuery {
    type Item = User;

    async fn execute(&self, session: &IdentitySession) -> Result<Vec<User>> {
        let store = session.store();
        let user_type = session.user_type();
        store.features().check_criteria(user_type, &self.criteria)?;

        let populated = self.populated();
        if populated == 0 {
            let all = store.find_identity_objects(user_type, &self.criteria).await?;
            return session.to_users(&all);
        }

        let pushed = pushed_criteria(populated, &self.criteria);
        let dimensions = DimensionResolver::new(session, None);
        let mut merge = DimensionMerge::new();

        if let Some(user) = &self.user {
            let found = session.user_object(user).await?;
            merge.add(dimensions.lookup(found, &pushed).await?);
        }

        let set_dimensions = [
            (Dimension::UsersOf { cascade: false }, &self.associated_groups),
            (Dimension::UsersOf { cascade: true }, &self.related_groups),
            (Dimension::RoleUsersOf, &self.role_groups),
        ];
        for (dimension, groups) in set_dimensions {
            if groups.is_empty() {
                continue;
            }
            let seeds: Vec<Subject<'_>> = groups.iter().map(Subject::from).collect();
            merge.add(dimensions.resolve(dimension, &seeds, &pushed).await?);
        }

        let users = finish_merge(session, merge, populated, &self.criteria).await?;
        tracing::trace!(dimensions = populated, results = users.len(), "Resolved user query");
        session.to_users(&users)
    }
}
