//! # idm-store
//!
//! Identity store abstraction.
//!
//! This crate defines the capability interface every backing store
//! implements and the description a store publishes about what it supports.
//! The query and relationship engine depends only on these types.
//!
//! ## Contents
//!
//! - [`IdentityStore`] - identity objects, relationships, relationship
//!   names, attributes and credentials
//! - [`FeaturesDescription`] - supported types, criteria and relationships
//! - [`MemoryIdentityStore`] - in-process adapter used for tests and as a
//!   role-capable backend

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod features;
pub mod memory;
pub mod store;

pub use features::{FeaturesDescription, FeaturesDescriptionBuilder};
pub use memory::MemoryIdentityStore;
pub use store::IdentityStore;
