//! # idm-store-ldap
//!
//! LDAP directory realization of the identity store, built on `ldap3`.
//!
//! ## Layout
//!
//! - [`config`] - store and per-type configuration
//! - [`filter`] and [`dn`] - filter AST and distinguished name helpers
//! - [`directory`] - the context seam, implemented by the pooled
//!   [`connection`] and by the in-process [`memory`] directory
//! - [`search`] - paged, sorted searches across context DNs
//! - [`mapper`] - membership edges stored as directory attributes
//! - [`provider`] - the [`LdapIdentityStore`] adapter
//!
//! ## Example
//!
//! ```rust,ignore
//! use idm_store_ldap::{LdapIdentityStore, LdapStoreConfig, LdapTypeConfig};
//!
//! let config = LdapStoreConfig::builder()
//!     .provider_url("ldaps://ldap.example.com")
//!     .admin_dn("cn=admin,dc=example,dc=com")
//!     .admin_password("secret")
//!     .identity_type("USER", LdapTypeConfig::new("uid", "ou=People,dc=example,dc=com"))
//!     .build()?;
//! let store = LdapIdentityStore::connect("ldap", config).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod connection;
pub mod directory;
pub mod dn;
pub mod error;
pub mod filter;
pub mod mapper;
pub mod memory;
pub mod provider;
pub mod search;

pub use config::{
    AuthMethod, LdapStoreConfig, LdapStoreConfigBuilder, LdapTypeConfig, MembershipAttribute,
    PasswordEncoding, SearchScope,
};
pub use connection::LdapConnectionPool;
pub use directory::{Directory, DirectoryContext};
pub use error::{LdapError, LdapResult};
pub use filter::Filter;
pub use mapper::RelationshipMapper;
pub use memory::MemoryDirectory;
pub use provider::LdapIdentityStore;
pub use search::LdapEntry;
