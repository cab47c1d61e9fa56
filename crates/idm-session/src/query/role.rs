//! Role queries.
//!
//! A role is the `(role type, user, group)` tuple itself, so role queries do
//! not merge dimensions. Each presence pattern of the three coordinates maps
//! to one fixed resolution:
//!
//! | user | group | role type | resolution |
//! |------|-------|-----------|------------|
//! | yes  | yes   | yes       | the role, if held |
//! | yes  | yes   | no        | one role per type the user holds in the group |
//! | yes  | no    | yes       | the user's roles of that type |
//! | yes  | no    | no        | every role of the user |
//! | no   | yes   | yes       | the group's roles of that type |
//! | no   | yes   | no        | every role in the group |
//! | no   | no    | yes       | unsupported |
//! | no   | no    | no        | empty |

use async_trait::async_trait;
use idm_core::{Error, QueryError, Result};
use idm_model::{Group, GroupKey, Role, RoleType, SearchCriteria, User};

use super::{Query, QueryBuilder};
use crate::criteria::apply_to_roles;
use crate::session::IdentitySession;

/// Accumulates the coordinates of a [`RoleQuery`].
#[derive(Debug, Clone, Default)]
pub struct RoleQueryBuilder {
    user: Option<User>,
    group: Option<Group>,
    role_type: Option<RoleType>,
    criteria: SearchCriteria,
}

impl RoleQueryBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the user coordinate.
    pub fn user(&mut self, user: User) -> &mut Self {
        self.user = Some(user);
        self
    }

    /// Sets the user coordinate by id.
    ///
    /// ## Errors
    ///
    /// Returns `IllegalArgument` for a blank id.
    pub fn user_id(&mut self, id: &str) -> Result<&mut Self> {
        Ok(self.user(User::new(id)?))
    }

    /// Sets the group coordinate.
    pub fn group(&mut self, group: Group) -> &mut Self {
        self.group = Some(group);
        self
    }

    /// Sets the group coordinate by key text.
    ///
    /// ## Errors
    ///
    /// Returns `IllegalArgument` for a malformed key.
    pub fn group_key(&mut self, key: &str) -> Result<&mut Self> {
        let key: GroupKey = key.parse()?;
        Ok(self.group(key.to_group()))
    }

    /// Sets the role type coordinate.
    pub fn role_type(&mut self, role_type: RoleType) -> &mut Self {
        self.role_type = Some(role_type);
        self
    }

    /// Sets the role type coordinate by name.
    ///
    /// ## Errors
    ///
    /// Returns `IllegalArgument` for a blank name.
    pub fn role_type_name(&mut self, name: &str) -> Result<&mut Self> {
        Ok(self.role_type(RoleType::new(name)?))
    }

    /// Clears every coordinate and criterium.
    pub fn reset(&mut self) -> &mut Self {
        *self = Self::default();
        self
    }

    /// Snapshots the builder into a query.
    #[must_use]
    pub fn create_query(&self) -> RoleQuery {
        RoleQuery {
            user: self.user.clone(),
            group: self.group.clone(),
            role_type: self.role_type.clone(),
            criteria: self.criteria.clone(),
        }
    }
}

impl QueryBuilder for RoleQueryBuilder {
    fn criteria_mut(&mut self) -> &mut SearchCriteria {
        &mut self.criteria
    }
}

/// Immutable role query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleQuery {
    user: Option<User>,
    group: Option<Group>,
    role_type: Option<RoleType>,
    criteria: SearchCriteria,
}

impl RoleQuery {
    /// Returns the user coordinate.
    #[must_use]
    pub const fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// Returns the group coordinate.
    #[must_use]
    pub const fn group(&self) -> Option<&Group> {
        self.group.as_ref()
    }

    /// Returns the role type coordinate.
    #[must_use]
    pub const fn role_type(&self) -> Option<&RoleType> {
        self.role_type.as_ref()
    }

    /// Returns the criteria.
    #[must_use]
    pub const fn criteria(&self) -> &SearchCriteria {
        &self.criteria
    }
}

#[async_trait]
impl Query for RoleQuery {
    type Item = Role;

    async fn execute(&self, session: &IdentitySession) -> Result<Vec<Role>> {
        // Roles carry no attributes; criteria act on the role type name.
        if self.criteria.needs_attributes() {
            return Err(Error::unsupported_criterium(
                "attribute filters and attribute sort on role queries",
            ));
        }

        let roles = session.roles();
        let resolved = match (&self.user, &self.group, &self.role_type) {
            (Some(user), Some(group), Some(role_type)) => roles
                .get_role(role_type, user, group)
                .await?
                .into_iter()
                .collect(),
            (Some(user), Some(group), None) => roles
                .find_role_types_of(user, group, &SearchCriteria::default())
                .await?
                .into_iter()
                .map(|rt| Role::new(rt, user.clone(), group.clone()))
                .collect(),
            (Some(user), None, role_type) => {
                roles.find_roles_of_user(user, role_type.as_ref()).await?
            }
            (None, Some(group), role_type) => {
                roles.find_roles_of_group(group, role_type.as_ref()).await?
            }
            (None, None, Some(role_type)) => {
                return Err(QueryError::UnsupportedCombination(format!(
                    "role type '{role_type}' without a user or a group"
                ))
                .into());
            }
            (None, None, None) => Vec::new(),
        };

        Ok(apply_to_roles(resolved, &self.criteria))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use idm_core::IdentityConfig;
    use idm_model::SortOrder;
    use idm_store::MemoryIdentityStore;

    use super::*;

    struct Fixture {
        session: IdentitySession,
        g1: Group,
        g2: Group,
        u1: User,
        u2: User,
        rt1: RoleType,
        rt2: RoleType,
    }

    /// U1 holds rt1 in G1 and G2 and rt2 in G1; U2 holds rt2 in G2.
    async fn fixture() -> Fixture {
        let store = MemoryIdentityStore::for_types("mem", "USER", &["ORG"]);
        let session = IdentitySession::new(Arc::new(store), IdentityConfig::default());
        let persistence = session.persistence();
        let g1 = persistence.create_group("G1", "ORG").await.unwrap();
        let g2 = persistence.create_group("G2", "ORG").await.unwrap();
        let u1 = persistence.create_user("U1").await.unwrap();
        let u2 = persistence.create_user("U2").await.unwrap();

        let roles = session.roles();
        let rt1 = roles.create_role_type("rt1").await.unwrap();
        let rt2 = roles.create_role_type("rt2").await.unwrap();
        roles.create_role(&rt1, &u1, &g1).await.unwrap();
        roles.create_role(&rt1, &u1, &g2).await.unwrap();
        roles.create_role(&rt2, &u1, &g1).await.unwrap();
        roles.create_role(&rt2, &u2, &g2).await.unwrap();

        Fixture { session, g1, g2, u1, u2, rt1, rt2 }
    }

    async fn count(f: &Fixture, builder: &RoleQueryBuilder) -> usize {
        f.session.list(&builder.create_query()).await.unwrap().len()
    }

    #[tokio::test]
    async fn every_supported_combination() {
        let f = fixture().await;
        let mut b = RoleQueryBuilder::new();

        b.user(f.u1.clone()).group(f.g1.clone()).role_type(f.rt1.clone());
        assert_eq!(count(&f, &b).await, 1);
        b.reset().user(f.u2.clone()).group(f.g1.clone()).role_type(f.rt1.clone());
        assert_eq!(count(&f, &b).await, 0);

        b.reset().user(f.u1.clone()).group(f.g1.clone());
        let roles = f.session.list(&b.create_query()).await.unwrap();
        let types: Vec<&str> = roles.iter().map(|r| r.role_type().name()).collect();
        assert_eq!(types, ["rt1", "rt2"]);

        b.reset().user(f.u1.clone()).role_type(f.rt1.clone());
        assert_eq!(count(&f, &b).await, 2);
        b.reset().user(f.u1.clone()).role_type(f.rt2.clone());
        assert_eq!(count(&f, &b).await, 1);
        b.reset().user(f.u1.clone());
        assert_eq!(count(&f, &b).await, 3);

        b.reset().group(f.g2.clone()).role_type(f.rt2.clone());
        let roles = f.session.list(&b.create_query()).await.unwrap();
        assert_eq!(roles, [Role::new(f.rt2.clone(), f.u2.clone(), f.g2.clone())]);
        b.reset().group(f.g2.clone());
        assert_eq!(count(&f, &b).await, 2);

        b.reset();
        assert_eq!(count(&f, &b).await, 0);
    }

    #[tokio::test]
    async fn role_type_alone_is_unsupported() {
        let f = fixture().await;
        let mut b = RoleQueryBuilder::new();
        b.role_type(f.rt1.clone());
        assert!(matches!(
            f.session.list(&b.create_query()).await,
            Err(Error::Query(QueryError::UnsupportedCombination(_)))
        ));
    }

    #[tokio::test]
    async fn criteria_on_role_type_names() {
        let f = fixture().await;
        let mut b = RoleQueryBuilder::new();
        b.user(f.u1.clone()).sort(SortOrder::Descending).page(0, 1);
        let roles = f.session.list(&b.create_query()).await.unwrap();
        assert_eq!(roles[0].role_type(), &f.rt2);

        b.reset().user(f.u1.clone()).id_filter("rt1").unwrap();
        assert_eq!(count(&f, &b).await, 2);

        b.reset()
            .user(f.u1.clone())
            .attribute_values_filter("x", &["y"])
            .unwrap();
        assert!(matches!(
            f.session.list(&b.create_query()).await,
            Err(Error::UnsupportedCriterium(_))
        ));
    }

    #[tokio::test]
    async fn unique_result_over_roles() {
        let f = fixture().await;
        let mut b = RoleQueryBuilder::new();
        b.user_id("U2").unwrap().group_key(&f.g2.key().to_string()).unwrap();
        let role = f.session.unique_result(&b.create_query()).await.unwrap();
        assert_eq!(role.map(|r| r.role_type().clone()), Some(f.rt2.clone()));

        b.reset().user(f.u1.clone());
        assert!(matches!(
            f.session.unique_result(&b.create_query()).await,
            Err(Error::Query(QueryError::AmbiguousResult(3)))
        ));
    }
}
