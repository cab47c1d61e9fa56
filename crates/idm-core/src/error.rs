//! Error handling for the identity management core.
//!
//! The taxonomy separates caller mistakes (illegal arguments, unsupported
//! criteria, insufficient query information) from store capability gaps and
//! from failures of the backing store itself. Not-found is never an error on
//! lookups: those return `Option` or an empty collection.

use thiserror::Error;

/// Result type alias using the identity management error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed source error carried by [`Error::Identity`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for identity management operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A query could not be performed.
    #[error("query error: {0}")]
    Query(#[from] QueryError),

    /// A builder criterium is not implementable by the active store.
    #[error("unsupported criterium: {0}")]
    UnsupportedCriterium(String),

    /// The store lacks the capability needed by the operation.
    #[error("operation not supported: {0}")]
    OperationNotSupported(String),

    /// Null-equivalent or malformed input, rejected before any I/O.
    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    /// The backing store failed while performing an operation.
    #[error("identity store failure during {operation}: {source}")]
    Identity {
        /// Operation that was being performed.
        operation: String,
        /// Underlying store or directory failure.
        #[source]
        source: BoxError,
    },

    /// The store holds data that violates a uniqueness expectation.
    #[error("data inconsistency: {0}")]
    DataInconsistency(String),

    /// The object to create already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A mutating operation referenced an object the store does not hold.
    #[error("not found: {0}")]
    NotFound(String),
}

/// Query-specific failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// No dimension was populated where the query requires at least one.
    #[error("not enough information to perform a query")]
    NotEnoughInformation,

    /// The combination of populated criteria has no defined resolution.
    #[error("unsupported combination of criteria: {0}")]
    UnsupportedCombination(String),

    /// A unique result was requested but the query matched several.
    #[error("more than one result ({0}) where a unique result was required")]
    AmbiguousResult(usize),
}

impl Error {
    /// Creates an illegal argument error.
    #[must_use]
    pub fn illegal_argument(msg: impl Into<String>) -> Self {
        Self::IllegalArgument(msg.into())
    }

    /// Creates an unsupported criterium error.
    #[must_use]
    pub fn unsupported_criterium(msg: impl Into<String>) -> Self {
        Self::UnsupportedCriterium(msg.into())
    }

    /// Creates an operation not supported error.
    #[must_use]
    pub fn not_supported(msg: impl Into<String>) -> Self {
        Self::OperationNotSupported(msg.into())
    }

    /// Wraps a store failure with the operation that was running.
    #[must_use]
    pub fn identity(operation: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Identity {
            operation: operation.into(),
            source: source.into(),
        }
    }

    /// Creates a data inconsistency error.
    #[must_use]
    pub fn inconsistent(msg: impl Into<String>) -> Self {
        Self::DataInconsistency(msg.into())
    }

    /// Creates an already-exists error.
    #[must_use]
    pub fn already_exists(what: impl Into<String>) -> Self {
        Self::AlreadyExists(what.into())
    }

    /// Creates a not-found error for mutating operations.
    #[must_use]
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Returns whether the caller supplied bad input.
    #[must_use]
    pub const fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::Query(_) | Self::UnsupportedCriterium(_) | Self::IllegalArgument(_)
        )
    }

    /// Returns whether the failure came from the backing store.
    #[must_use]
    pub const fn is_store_error(&self) -> bool {
        matches!(self, Self::Identity { .. } | Self::DataInconsistency(_))
    }
}

/// Rejects empty or whitespace-only string arguments.
///
/// ## Errors
///
/// Returns [`Error::IllegalArgument`] naming `what` when `value` is blank.
pub fn require_non_blank<'a>(value: &'a str, what: &str) -> Result<&'a str> {
    if value.trim().is_empty() {
        return Err(Error::illegal_argument(format!("{what} must not be empty")));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_errors_are_caller_errors() {
        let err: Error = QueryError::NotEnoughInformation.into();
        assert!(err.is_caller_error());
        assert!(!err.is_store_error());
        assert_eq!(
            err.to_string(),
            "query error: not enough information to perform a query"
        );
    }

    #[test]
    fn identity_error_keeps_operation_context() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = Error::identity("find identity object", io);

        assert!(err.is_store_error());
        let msg = err.to_string();
        assert!(msg.contains("find identity object"));
        assert!(msg.contains("refused"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn unsupported_criterium_is_distinct_from_illegal_argument() {
        let unsupported = Error::unsupported_criterium("sort by attribute");
        let illegal = Error::illegal_argument("name");

        assert!(matches!(unsupported, Error::UnsupportedCriterium(_)));
        assert!(matches!(illegal, Error::IllegalArgument(_)));
    }

    #[test]
    fn blank_arguments_are_rejected() {
        assert!(require_non_blank("jdoe", "user name").is_ok());
        let err = require_non_blank("  ", "user name").unwrap_err();
        assert!(err.to_string().contains("user name must not be empty"));
    }

    #[test]
    fn ambiguous_result_reports_count() {
        let err = QueryError::AmbiguousResult(3);
        assert!(err.to_string().contains('3'));
    }
}
