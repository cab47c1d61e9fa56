//! # idm-cache
//!
//! Cache side-channel for identity stores.
//!
//! Entries live under a namespace (one per store). Reads check the cache
//! first and populate it on miss; any write to the store drops its whole
//! namespace.
//!
//! - [`CacheProvider`] - object-safe namespaced get/put/invalidate
//! - [`CacheProviderExt`] - typed helpers on top of any provider
//! - [`MemoryCache`] - in-process implementation

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod memory;
pub mod provider;

pub use error::{CacheError, CacheResult};
pub use memory::MemoryCache;
pub use provider::{CacheProvider, CacheProviderExt};
