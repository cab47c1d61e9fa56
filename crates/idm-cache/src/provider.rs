//! Cache provider traits.

use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::CacheResult;

/// Namespaced key-value cache.
///
/// Implementations must be thread-safe and support concurrent access.
/// Values are stored as JSON so the trait stays object-safe; use
/// [`CacheProviderExt`] for typed access.
#[async_trait]
pub trait CacheProvider: Send + Sync {
    /// Gets a raw value.
    ///
    /// Returns `None` if the key doesn't exist or has expired.
    async fn get_value(&self, namespace: &str, key: &str) -> CacheResult<Option<serde_json::Value>>;

    /// Stores a raw value with optional TTL.
    ///
    /// If `ttl` is `None`, the provider's default applies.
    async fn put_value(
        &self,
        namespace: &str,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> CacheResult<()>;

    /// Deletes one entry.
    ///
    /// Returns `Ok(())` even if the key doesn't exist.
    async fn delete(&self, namespace: &str, key: &str) -> CacheResult<()>;

    /// Drops every entry of a namespace and returns how many were dropped.
    async fn invalidate(&self, namespace: &str) -> CacheResult<u64>;

    /// Drops every entry of every namespace.
    async fn invalidate_all(&self) -> CacheResult<()>;
}

/// Typed access on top of [`CacheProvider`].
#[async_trait]
pub trait CacheProviderExt: CacheProvider {
    /// Gets and deserializes a value.
    ///
    /// ## Errors
    ///
    /// Returns `CacheError::Serialization` if the stored value has another shape.
    async fn get<T>(&self, namespace: &str, key: &str) -> CacheResult<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        match self.get_value(namespace, key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Serializes and stores a value.
    async fn put<T>(&self, namespace: &str, key: &str, value: &T, ttl: Option<Duration>) -> CacheResult<()>
    where
        T: Serialize + Sync,
    {
        let value = serde_json::to_value(value)?;
        self.put_value(namespace, key, value, ttl).await
    }
}

impl<C: CacheProvider + ?Sized> CacheProviderExt for C {}
