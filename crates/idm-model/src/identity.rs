//! Store-level identity objects and relationships.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Multi-valued attributes keyed by name.
pub type Attributes = BTreeMap<String, Vec<String>>;

/// Name of an identity object type (e.g. `USER`, `ORGANIZATION`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityObjectType(String);

impl IdentityObjectType {
    /// Creates a new identity object type.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IdentityObjectType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// An identity as persisted by a backing store.
///
/// The `id` is store-specific: a distinguished name for directory stores,
/// an opaque key for the in-memory store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityObject {
    /// Store-specific unique identifier.
    pub id: String,
    /// Unique name within its type.
    pub name: String,
    /// Identity object type.
    pub object_type: IdentityObjectType,
}

impl IdentityObject {
    /// Creates a new identity object.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        object_type: IdentityObjectType,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            object_type,
        }
    }

    /// Checks whether this object has the given type.
    #[must_use]
    pub fn is_of_type(&self, object_type: &IdentityObjectType) -> bool {
        &self.object_type == object_type
    }
}

/// The closed set of relationship kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipKind {
    /// Plain membership: group "parent of" group, group "contains" user.
    Member,
    /// Role-tagged membership between a group and a user.
    Role,
}

impl RelationshipKind {
    /// Returns the canonical relationship kind name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Member => "MEMBER",
            Self::Role => "ROLE",
        }
    }

    /// Checks whether relationships of this kind carry a name.
    #[must_use]
    pub const fn is_named(&self) -> bool {
        matches!(self, Self::Role)
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to search for relative to a given identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Identities that hold the given identity (ascendants).
    Parents,
    /// Identities held by the given identity (descendants).
    Children,
}

impl Direction {
    /// Returns the opposite direction.
    #[must_use]
    pub const fn reverse(self) -> Self {
        match self {
            Self::Parents => Self::Children,
            Self::Children => Self::Parents,
        }
    }
}

/// A directed, kind-tagged edge between two identity objects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityObjectRelationship {
    /// Parent side.
    pub from: IdentityObject,
    /// Child side.
    pub to: IdentityObject,
    /// Relationship kind.
    pub kind: RelationshipKind,
    /// Relationship name (role type name for [`RelationshipKind::Role`]).
    pub name: Option<String>,
}

impl IdentityObjectRelationship {
    /// Creates a membership edge.
    #[must_use]
    pub const fn member(from: IdentityObject, to: IdentityObject) -> Self {
        Self {
            from,
            to,
            kind: RelationshipKind::Member,
            name: None,
        }
    }

    /// Creates a named role edge.
    #[must_use]
    pub fn role(from: IdentityObject, to: IdentityObject, name: impl Into<String>) -> Self {
        Self {
            from,
            to,
            kind: RelationshipKind::Role,
            name: Some(name.into()),
        }
    }
}
