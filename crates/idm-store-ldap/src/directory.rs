//! Directory access seam.
//!
//! The store talks to the directory through a [`Directory`] that hands out
//! connection-scoped [`DirectoryContext`]s. A context is released when it
//! is dropped, so every exit path of an operation gives its connection back.

use async_trait::async_trait;
use idm_model::Attributes;

use crate::config::SearchScope;
use crate::error::LdapResult;
use crate::filter::Filter;
use crate::search::LdapEntry;

/// Server-side sort key (RFC 2891).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    /// Attribute to sort on.
    pub attribute: String,
    /// Descending order.
    pub reverse: bool,
}

/// One search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Search base.
    pub base: String,
    /// Search scope.
    pub scope: SearchScope,
    /// Search filter.
    pub filter: Filter,
    /// Requested attributes; empty or `*` means all user attributes.
    pub attributes: Vec<String>,
    /// Paged results control size.
    pub page_size: u32,
    /// Sort control, sent only when the server supports it.
    pub sort: Option<SortKey>,
    /// Server-side time limit in seconds.
    pub time_limit: Option<u32>,
}

impl SearchRequest {
    /// Creates a request for all attributes.
    #[must_use]
    pub fn new(base: impl Into<String>, scope: SearchScope, filter: Filter) -> Self {
        Self {
            base: base.into(),
            scope,
            filter,
            attributes: vec!["*".to_string()],
            page_size: crate::config::DEFAULT_MAX_SEARCH_RESULTS,
            sort: None,
            time_limit: None,
        }
    }
}

/// Kind of attribute modification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifyOp {
    /// Add values.
    Add,
    /// Delete values, or the whole attribute when no value is given.
    Delete,
    /// Replace all values.
    Replace,
}

/// One attribute modification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modification {
    /// Operation.
    pub op: ModifyOp,
    /// Attribute name.
    pub attribute: String,
    /// Values.
    pub values: Vec<String>,
}

impl Modification {
    /// Adds values.
    #[must_use]
    pub fn add(attribute: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            op: ModifyOp::Add,
            attribute: attribute.into(),
            values,
        }
    }

    /// Deletes values (all values when empty).
    #[must_use]
    pub fn delete(attribute: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            op: ModifyOp::Delete,
            attribute: attribute.into(),
            values,
        }
    }

    /// Replaces values.
    #[must_use]
    pub fn replace(attribute: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            op: ModifyOp::Replace,
            attribute: attribute.into(),
            values,
        }
    }
}

/// A connection-scoped directory context.
#[async_trait]
pub trait DirectoryContext: Send {
    /// Runs a search, following paged results until exhausted.
    ///
    /// A missing search base yields an empty result.
    async fn search(&mut self, request: &SearchRequest) -> LdapResult<Vec<LdapEntry>>;

    /// Adds an entry.
    async fn add(&mut self, dn: &str, attributes: &Attributes) -> LdapResult<()>;

    /// Modifies an entry.
    async fn modify(&mut self, dn: &str, modifications: &[Modification]) -> LdapResult<()>;

    /// Deletes an entry.
    async fn delete(&mut self, dn: &str) -> LdapResult<()>;

    /// Checks a password by binding as `dn`, without disturbing this context.
    async fn bind(&mut self, dn: &str, password: &str) -> LdapResult<bool>;

    /// Replaces a password attribute with raw bytes.
    async fn set_password(&mut self, dn: &str, attribute: &str, value: Vec<u8>) -> LdapResult<()>;
}

/// Source of directory contexts.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Opens a context.
    ///
    /// ## Errors
    ///
    /// Returns a connection error if the directory cannot be reached.
    async fn open(&self) -> LdapResult<Box<dyn DirectoryContext>>;
}
