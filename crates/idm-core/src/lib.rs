//! # idm-core
//!
//! Core error taxonomy and configuration for the identity management crates.
//!
//! Every other crate in the workspace reports failures through [`Error`], so a
//! caller sees one taxonomy regardless of which backing store answered.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;

pub use config::IdentityConfig;
pub use error::{Error, QueryError, Result};
