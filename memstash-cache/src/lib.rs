//! Compare-and-swap and key normalization for memcached-backed cache stores.
//!
//! Provides a cache store that maps arbitrary logical names onto
//! memcached-safe keys and updates entries atomically with the memcached
//! `gets`/`cas` protocol.
//!
//! # Features
//!
//! - `memcached` - Enable the Memcached backend (requires explicit opt-in)
//! - **Key normalization** - Byte-level escaping and digest-suffixed truncation to 250 bytes
//! - **Compare-and-swap** - Single-key and batch read-transform-write cycles
//! - **Async facade** - Runs blocking backend calls on tokio's blocking pool
//!
//! # Examples
//!
//! ## Single-key CAS
//!
//! ```
//! use memstash_cache::*;
//!
//! let store = MemCacheStore::new(InMemoryBackend::new(), CacheConfig::in_memory());
//! let options = CacheOptions::new();
//!
//! store.write("counter", &5u64, &options);
//! assert!(store.cas("counter", &options, |v: u64| Some(v + 1)));
//! assert_eq!(store.read::<u64>("counter", &options), Some(6));
//! ```
//!
//! ## Batch CAS
//!
//! ```
//! use memstash_cache::*;
//! use std::collections::HashMap;
//!
//! let store = MemCacheStore::new(InMemoryBackend::new(), CacheConfig::in_memory());
//! let options = CacheOptions::new();
//! store.write("a", &1u64, &options);
//!
//! // Only live entries reach the closure; "b" was never written.
//! let ok = store.cas_multi(&["a", "b"], &options, |values: HashMap<&str, u64>| {
//!     assert_eq!(values.len(), 1);
//!     values.into_iter().map(|(name, v)| (name, v + 1)).collect()
//! });
//! assert!(ok);
//! ```
//!
//! ## Memcached (requires `memcached` feature)
//!
//! ```ignore
//! use memstash_cache::*;
//! use std::time::Duration;
//!
//! fn main() -> Result<(), CacheError> {
//!     let config = CacheConfig::memcached("memcache://localhost:11211")
//!         .with_namespace("app")
//!         .with_default_ttl(Duration::from_secs(3600));
//!     let backend = MemcachedBackend::connect(&config)?;
//!     let store = MemCacheStore::new(backend, config);
//!
//!     store.try_cas("counter", &CacheOptions::new(), |v: u64| Some(v + 1))?;
//!     Ok(())
//! }
//! ```

pub mod async_store;
pub mod backend;
pub mod config;
pub mod entry;
pub mod error;
pub mod key;
pub mod options;
pub mod store;
pub mod traits;

pub use async_store::AsyncMemCacheStore;
pub use backend::{Backend, CasCapable, InMemoryBackend, VersionToken};
pub use config::{CacheBackend, CacheConfig};
pub use entry::CacheEntry;
pub use error::{CacheError, CacheResult};
pub use key::normalize_key;
pub use options::CacheOptions;
pub use store::{CasMultiReport, MemCacheStore};
pub use traits::CacheStore;

#[cfg(feature = "memcached")]
pub use backend::MemcachedBackend;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::async_store::AsyncMemCacheStore;
    pub use crate::backend::{Backend, CasCapable, InMemoryBackend};
    pub use crate::config::CacheConfig;
    pub use crate::error::{CacheError, CacheResult};
    pub use crate::options::CacheOptions;
    pub use crate::store::{CasMultiReport, MemCacheStore};
    pub use crate::traits::CacheStore;

    #[cfg(feature = "memcached")]
    pub use crate::backend::MemcachedBackend;
}
