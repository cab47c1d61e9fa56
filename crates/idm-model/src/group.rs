//! Group domain model.
//!
//! Groups are identified by the `(name, type)` pair. The pair has a
//! reversible text encoding, the [`GroupKey`], used wherever a single string
//! identifier is needed.

use std::fmt;
use std::str::FromStr;

use idm_core::error::{require_non_blank, Error, Result};
use serde::{Deserialize, Serialize};

/// Prefix of every encoded group key.
pub const GROUP_KEY_PREFIX: &str = "idm_group_id";

/// Separator between the key parts.
pub const GROUP_KEY_SEPARATOR: &str = "_._._";

/// A typed group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Group {
    name: String,
    group_type: String,
}

impl Group {
    /// Creates a group reference.
    ///
    /// ## Errors
    ///
    /// Returns `IllegalArgument` if either part is blank or contains the key
    /// prefix or separator.
    pub fn new(name: impl Into<String>, group_type: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let group_type = group_type.into();
        validate_part(&name, "group name")?;
        validate_part(&group_type, "group type")?;
        Ok(Self { name, group_type })
    }

    /// Returns the group name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the group type.
    #[must_use]
    pub fn group_type(&self) -> &str {
        &self.group_type
    }

    /// Returns the encoded key for this group.
    #[must_use]
    pub fn key(&self) -> GroupKey {
        GroupKey {
            name: self.name.clone(),
            group_type: self.group_type.clone(),
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.group_type)
    }
}

fn validate_part(value: &str, what: &str) -> Result<()> {
    require_non_blank(value, what)?;
    if value.contains(GROUP_KEY_SEPARATOR) || value.contains(GROUP_KEY_PREFIX) {
        return Err(Error::illegal_argument(format!(
            "{what} '{value}' contains a reserved group key sequence"
        )));
    }
    Ok(())
}

/// Reversible string identifier of a group's `(name, type)` pair.
///
/// The text form is `idm_group_id_._._<type>_._._<name>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GroupKey {
    name: String,
    group_type: String,
}

impl GroupKey {
    /// Creates a key from its parts.
    ///
    /// ## Errors
    ///
    /// Returns `IllegalArgument` under the same rules as [`Group::new`].
    pub fn new(name: impl Into<String>, group_type: impl Into<String>) -> Result<Self> {
        Group::new(name, group_type).map(|g| g.key())
    }

    /// Returns the group name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the group type.
    #[must_use]
    pub fn group_type(&self) -> &str {
        &self.group_type
    }

    /// Converts the key back into a group.
    #[must_use]
    pub fn to_group(&self) -> Group {
        Group {
            name: self.name.clone(),
            group_type: self.group_type.clone(),
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{GROUP_KEY_PREFIX}{GROUP_KEY_SEPARATOR}{}{GROUP_KEY_SEPARATOR}{}",
            self.group_type, self.name
        )
    }
}

impl FromStr for GroupKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let malformed = || Error::illegal_argument(format!("malformed group key '{s}'"));

        let rest = s
            .strip_prefix(GROUP_KEY_PREFIX)
            .and_then(|r| r.strip_prefix(GROUP_KEY_SEPARATOR))
            .ok_or_else(malformed)?;
        let (group_type, name) = rest.split_once(GROUP_KEY_SEPARATOR).ok_or_else(malformed)?;

        Self::new(name, group_type)
    }
}

impl TryFrom<String> for GroupKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<GroupKey> for String {
    fn from(key: GroupKey) -> Self {
        key.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_round_trips() {
        let group = Group::new("Engineering Dept", "ORGANIZATION_UNIT").unwrap();
        let text = group.key().to_string();

        assert_eq!(
            text,
            "idm_group_id_._._ORGANIZATION_UNIT_._._Engineering Dept"
        );

        let parsed: GroupKey = text.parse().unwrap();
        assert_eq!(parsed.name(), "Engineering Dept");
        assert_eq!(parsed.group_type(), "ORGANIZATION_UNIT");
        assert_eq!(parsed.to_group(), group);
    }

    #[test]
    fn names_with_reserved_sequences_are_rejected() {
        assert!(Group::new("a_._._b", "OU").is_err());
        assert!(Group::new("idm_group_id", "OU").is_err());
        assert!(Group::new("sales", "x_._._y").is_err());
        assert!(GroupKey::new("", "OU").is_err());
    }

    #[test]
    fn malformed_keys_are_rejected() {
        assert!("sales:OU".parse::<GroupKey>().is_err());
        assert!("idm_group_id_._._OU".parse::<GroupKey>().is_err());
        assert!("idm_group_id_._.__._._sales".parse::<GroupKey>().is_err());
    }

    #[test]
    fn key_serializes_as_string() {
        let key = GroupKey::new("sales", "OU").unwrap();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, r#""idm_group_id_._._OU_._._sales""#);

        let back: GroupKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }
}
