//! Cache error types.

use thiserror::Error;

/// Cache operation errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Serialization/deserialization error.
    #[error("cache serialization error: {0}")]
    Serialization(String),
    /// Internal cache error.
    #[error("internal cache error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CacheError::Internal("poisoned".to_string());
        assert_eq!(err.to_string(), "internal cache error: poisoned");

        let json_err = serde_json::from_str::<u32>("nope").unwrap_err();
        let err: CacheError = json_err.into();
        assert!(matches!(err, CacheError::Serialization(_)));
    }
}
