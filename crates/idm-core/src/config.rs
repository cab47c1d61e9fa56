//! Session-level identity configuration.
//!
//! Maps the API-level notions (users, typed groups) onto the identity object
//! type names a backing store understands.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default identity object type name used for users.
pub const DEFAULT_USER_TYPE: &str = "USER";

/// Identity configuration consumed by a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Identity object type name that stores users.
    pub user_identity_type: String,

    /// Group type -> identity object type name.
    ///
    /// Group types without an entry map to an identity type of the same name.
    pub group_type_mapping: BTreeMap<String, String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            user_identity_type: DEFAULT_USER_TYPE.to_string(),
            group_type_mapping: BTreeMap::new(),
        }
    }
}

impl IdentityConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> IdentityConfigBuilder {
        IdentityConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// ## Errors
    ///
    /// Returns an error if the user type is blank or a group type maps onto
    /// the user type.
    pub fn validate(&self) -> Result<()> {
        if self.user_identity_type.trim().is_empty() {
            return Err(Error::illegal_argument("user_identity_type cannot be empty"));
        }

        for (group_type, identity_type) in &self.group_type_mapping {
            if group_type.trim().is_empty() || identity_type.trim().is_empty() {
                return Err(Error::illegal_argument(
                    "group type mappings cannot contain empty names",
                ));
            }
            if identity_type == &self.user_identity_type {
                return Err(Error::illegal_argument(format!(
                    "group type '{group_type}' cannot map onto the user identity type"
                )));
            }
        }

        Ok(())
    }

    /// Returns the identity object type name for a group type.
    #[must_use]
    pub fn identity_type_for_group(&self, group_type: &str) -> String {
        self.group_type_mapping
            .get(group_type)
            .cloned()
            .unwrap_or_else(|| group_type.to_string())
    }

    /// Returns the group type stored under an identity object type name.
    ///
    /// Returns `None` for the user identity type.
    #[must_use]
    pub fn group_type_for_identity(&self, identity_type: &str) -> Option<String> {
        if identity_type == self.user_identity_type {
            return None;
        }

        let mapped = self
            .group_type_mapping
            .iter()
            .find(|(_, v)| v.as_str() == identity_type)
            .map(|(k, _)| k.clone());

        Some(mapped.unwrap_or_else(|| identity_type.to_string()))
    }

    /// Checks whether an identity object type name stores users.
    #[must_use]
    pub fn is_user_type(&self, identity_type: &str) -> bool {
        self.user_identity_type == identity_type
    }
}

/// Builder for [`IdentityConfig`].
#[derive(Debug, Default)]
pub struct IdentityConfigBuilder {
    user_identity_type: Option<String>,
    group_type_mapping: BTreeMap<String, String>,
}

impl IdentityConfigBuilder {
    /// Sets the identity type used for users.
    #[must_use]
    pub fn user_identity_type(mut self, name: impl Into<String>) -> Self {
        self.user_identity_type = Some(name.into());
        self
    }

    /// Maps a group type onto an identity object type.
    #[must_use]
    pub fn map_group_type(
        mut self,
        group_type: impl Into<String>,
        identity_type: impl Into<String>,
    ) -> Self {
        self.group_type_mapping
            .insert(group_type.into(), identity_type.into());
        self
    }

    /// Builds and validates the configuration.
    ///
    /// ## Errors
    ///
    /// Returns an error if validation fails.
    pub fn build(self) -> Result<IdentityConfig> {
        let config = IdentityConfig {
            user_identity_type: self
                .user_identity_type
                .unwrap_or_else(|| DEFAULT_USER_TYPE.to_string()),
            group_type_mapping: self.group_type_mapping,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmapped_group_type_is_identity() {
        let config = IdentityConfig::default();
        assert_eq!(config.identity_type_for_group("ORGANIZATION"), "ORGANIZATION");
        assert_eq!(
            config.group_type_for_identity("ORGANIZATION").as_deref(),
            Some("ORGANIZATION")
        );
        assert_eq!(config.group_type_for_identity(DEFAULT_USER_TYPE), None);
    }

    #[test]
    fn mapped_group_type_round_trips() {
        let config = IdentityConfig::builder()
            .map_group_type("OU", "ORGANIZATION_UNIT")
            .build()
            .unwrap();

        assert_eq!(config.identity_type_for_group("OU"), "ORGANIZATION_UNIT");
        assert_eq!(
            config.group_type_for_identity("ORGANIZATION_UNIT").as_deref(),
            Some("OU")
        );
    }

    #[test]
    fn group_type_cannot_shadow_users() {
        let result = IdentityConfig::builder()
            .map_group_type("PEOPLE", DEFAULT_USER_TYPE)
            .build();
        assert!(matches!(result, Err(Error::IllegalArgument(_))));
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: IdentityConfig =
            serde_json::from_str(r#"{"group_type_mapping":{"OU":"UNIT"}}"#).unwrap();
        assert_eq!(config.user_identity_type, DEFAULT_USER_TYPE);
        assert_eq!(config.identity_type_for_group("OU"), "UNIT");
    }
}
