//! # idm-model
//!
//! Domain model for identity management.
//!
//! - [`User`], [`Group`] (name + type, addressed by [`GroupKey`]),
//!   [`RoleType`] and [`Role`] are the API-level identities.
//! - [`IdentityObject`] and [`IdentityObjectRelationship`] are what a
//!   backing store persists and reports.
//! - [`SearchCriteria`] carries the secondary modifiers (sort, filters,
//!   paging) applied to query results.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod criteria;
pub mod group;
pub mod identity;
pub mod role;
pub mod user;

pub use criteria::{wildcard_match, CriteriaKind, Page, SearchCriteria, SortOrder};
pub use group::{Group, GroupKey};
pub use identity::{
    Attributes, Direction, IdentityObject, IdentityObjectRelationship, IdentityObjectType,
    RelationshipKind,
};
pub use role::{Role, RoleType};
pub use user::User;
