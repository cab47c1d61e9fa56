//! LDAP-specific error types.
//!
//! ## Security Note
//!
//! Error messages must not leak sensitive information like
//! passwords or bind credentials.

use thiserror::Error;

/// LDAP-specific errors.
#[derive(Debug, Error)]
pub enum LdapError {
    /// Invalid configuration.
    #[error("LDAP configuration error: {0}")]
    Configuration(String),

    /// Connection failed.
    #[error("LDAP connection failed: {0}")]
    Connection(String),

    /// Bind (authentication) failed.
    #[error("LDAP bind failed: {0}")]
    Bind(String),

    /// Search operation failed.
    #[error("LDAP search failed: {0}")]
    Search(String),

    /// Add, modify or delete failed.
    #[error("LDAP modify failed: {0}")]
    Modify(String),

    /// The entry to create already exists.
    #[error("LDAP entry already exists: {0}")]
    EntryExists(String),

    /// The entry (or its parent) does not exist.
    #[error("No such LDAP entry: {0}")]
    NoSuchEntry(String),

    /// Invalid DN format, or a DN no configured type accounts for.
    #[error("Invalid DN: {0}")]
    InvalidDn(String),

    /// Malformed search filter.
    #[error("Invalid LDAP filter: {0}")]
    Filter(String),

    /// The directory holds several entries where one was expected.
    #[error("Directory data inconsistency: {0}")]
    Inconsistent(String),

    /// A value collides with one the directory layout reserves.
    #[error("Reserved LDAP value: {0}")]
    Reserved(String),

    /// Timeout error.
    #[error("LDAP operation timed out")]
    Timeout,

    /// Protocol error from LDAP server.
    #[error("LDAP protocol error: {0}")]
    Protocol(String),
}

impl LdapError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates a connection error.
    #[must_use]
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a search error.
    #[must_use]
    pub fn search(msg: impl Into<String>) -> Self {
        Self::Search(msg.into())
    }

    /// Creates a modify error.
    #[must_use]
    pub fn modify(msg: impl Into<String>) -> Self {
        Self::Modify(msg.into())
    }

    /// Creates an invalid DN error.
    #[must_use]
    pub fn invalid_dn(msg: impl Into<String>) -> Self {
        Self::InvalidDn(msg.into())
    }

    /// Creates a filter error.
    #[must_use]
    pub fn filter(msg: impl Into<String>) -> Self {
        Self::Filter(msg.into())
    }

    /// Checks if this is a connection-related error.
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout)
    }

    /// Converts into the core taxonomy, naming the operation that failed.
    ///
    /// Existence and consistency failures keep their own variants; every
    /// other directory failure becomes [`idm_core::Error::Identity`].
    #[must_use]
    pub fn during(self, operation: &str) -> idm_core::Error {
        match self {
            Self::EntryExists(dn) => idm_core::Error::already_exists(dn),
            Self::NoSuchEntry(dn) => idm_core::Error::not_found(dn),
            Self::Inconsistent(msg) => idm_core::Error::inconsistent(msg),
            Self::Reserved(msg) => idm_core::Error::illegal_argument(msg),
            other => idm_core::Error::identity(operation, other),
        }
    }
}

impl From<ldap3::LdapError> for LdapError {
    fn from(err: ldap3::LdapError) -> Self {
        match err {
            ldap3::LdapError::Timeout { .. } => Self::Timeout,
            other => Self::Protocol(other.to_string()),
        }
    }
}

impl From<LdapError> for idm_core::Error {
    fn from(err: LdapError) -> Self {
        err.during("directory operation")
    }
}

/// Result type for LDAP operations.
pub type LdapResult<T> = Result<T, LdapError>;
