//! User domain model.

use std::fmt;

use idm_core::error::{require_non_blank, Result};
use serde::{Deserialize, Serialize};

/// A user, identified by its unique name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct User {
    id: String,
}

impl User {
    /// Creates a user reference.
    ///
    /// ## Errors
    ///
    /// Returns `IllegalArgument` if the name is blank.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        require_non_blank(&id, "user id")?;
        Ok(Self { id })
    }

    /// Returns the unique user name.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_requires_name() {
        assert_eq!(User::new("jdoe").unwrap().id(), "jdoe");
        assert!(User::new("").is_err());
    }
}
