//! # idm-session
//!
//! Session-scoped identity management on top of an [`IdentityStore`].
//!
//! An [`IdentitySession`] binds a store to an [`IdentityConfig`] and hands
//! out managers for the high-level operations:
//! - [`PersistenceManager`] - user and group lifecycle
//! - [`RelationshipManager`] - group membership, optionally cascading
//! - [`RoleManager`] - role types and role grants
//! - [`AttributesManager`] - attributes and password credentials
//!
//! Queries over users, groups and roles are built with the builders in
//! [`query`] and run through [`IdentitySession::list`] or
//! [`IdentitySession::unique_result`].
//!
//! Every mutation is bracketed by a pre and a post [`IdentityEvent`] sent to
//! the registered [`EventListener`]s.
//!
//! [`IdentityStore`]: idm_store::IdentityStore
//! [`IdentityConfig`]: idm_core::IdentityConfig

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod attribute;
pub mod criteria;
pub mod event;
pub mod persistence;
pub mod query;
pub mod relationship;
pub mod resolver;
pub mod role;
pub mod session;

pub use attribute::{AttributesManager, Subject};
pub use criteria::CriteriaApplier;
pub use event::{
    EventAction, EventCategory, EventDispatcher, EventListener, EventPayload, EventPhase,
    IdentityEvent, InMemoryEventListener, TracingEventListener,
};
pub use persistence::PersistenceManager;
pub use query::{
    GroupQuery, GroupQueryBuilder, Query, QueryBuilder, RoleQuery, RoleQueryBuilder, UserQuery,
    UserQueryBuilder,
};
pub use relationship::RelationshipManager;
pub use resolver::RelationshipResolver;
pub use role::RoleManager;
pub use session::IdentitySession;
