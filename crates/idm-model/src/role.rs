//! Role types and role assignments.
//!
//! A role is the ternary fact `(role type, user, group)`. It either exists
//! or it does not; there is no multiplicity.

use std::fmt;

use idm_core::error::{require_non_blank, Result};
use serde::{Deserialize, Serialize};

use crate::group::Group;
use crate::user::User;

/// A named relationship category, global across all user/group pairs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoleType {
    name: String,
}

impl RoleType {
    /// Creates a role type reference.
    ///
    /// ## Errors
    ///
    /// Returns `IllegalArgument` if the name is blank.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        require_non_blank(&name, "role type name")?;
        Ok(Self { name })
    }

    /// Returns the role type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for RoleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A role assignment of a user within a group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Role {
    role_type: RoleType,
    user: User,
    group: Group,
}

impl Role {
    /// Creates a role value.
    #[must_use]
    pub const fn new(role_type: RoleType, user: User, group: Group) -> Self {
        Self {
            role_type,
            user,
            group,
        }
    }

    /// Returns the role type.
    #[must_use]
    pub const fn role_type(&self) -> &RoleType {
        &self.role_type
    }

    /// Returns the user holding the role.
    #[must_use]
    pub const fn user(&self) -> &User {
        &self.user
    }

    /// Returns the group the role applies to.
    #[must_use]
    pub const fn group(&self) -> &Group {
        &self.group
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.role_type, self.user, self.group.key())
    }
}
