//! Cache store with compare-and-swap support.

use crate::backend::{Backend, CasCapable, VersionToken};
use crate::config::CacheConfig;
use crate::entry::{decode_payload, encode_payload, CacheEntry};
use crate::error::{CacheError, CacheResult};
use crate::key::normalize_key;
use crate::options::CacheOptions;
use serde::{de::DeserializeOwned, de::IgnoredAny, Serialize};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Per-name outcome of a batch compare-and-swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CasMultiReport<K> {
    /// Names whose new value was stored
    pub committed: Vec<K>,

    /// Names whose write lost a race with another writer
    pub conflicted: Vec<K>,

    /// Names returned by the transform that had no live read to swap against
    pub dropped: Vec<K>,
}

impl<K> Default for CasMultiReport<K> {
    fn default() -> Self {
        Self {
            committed: Vec::new(),
            conflicted: Vec::new(),
            dropped: Vec::new(),
        }
    }
}

/// Memcached-style cache store.
///
/// Every operation comes in two forms: `try_*` returns the underlying
/// [`CacheError`], the plain form logs the error and returns a fallback
/// (`false`, `None`) so cache trouble never reaches the caller as an error.
pub struct MemCacheStore<B: CasCapable> {
    backend: Arc<B>,
    config: CacheConfig,
    defaults: CacheOptions,
}

impl<B: CasCapable> MemCacheStore<B> {
    /// Create a store over `backend`.
    ///
    /// # Examples
    ///
    /// ```
    /// use memstash_cache::{CacheConfig, CacheOptions, InMemoryBackend, MemCacheStore};
    ///
    /// let store = MemCacheStore::new(InMemoryBackend::new(), CacheConfig::in_memory());
    /// assert!(store.write("counter", &5u64, &CacheOptions::new()));
    /// assert!(store.cas("counter", &CacheOptions::new(), |v: u64| Some(v + 1)));
    /// assert_eq!(store.read::<u64>("counter", &CacheOptions::new()), Some(6));
    /// ```
    pub fn new(backend: B, config: CacheConfig) -> Self {
        Self::with_shared_backend(Arc::new(backend), config)
    }

    /// Create a store over a backend shared with other stores.
    pub fn with_shared_backend(backend: Arc<B>, config: CacheConfig) -> Self {
        let defaults = config.default_options();
        Self {
            backend,
            config,
            defaults,
        }
    }

    /// The underlying backend.
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// The store configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn merged_options(&self, options: &CacheOptions) -> CacheOptions {
        options.merged_with(&self.defaults)
    }

    /// Key that `name` is stored under, after applying store defaults.
    pub fn normalize_key(&self, name: impl AsRef<[u8]>, options: &CacheOptions) -> String {
        normalize_key(name, &self.merged_options(options))
    }

    // ========== Base Operations ==========

    /// Read a live value.
    pub fn try_read<T: DeserializeOwned>(
        &self,
        name: impl AsRef<[u8]>,
        options: &CacheOptions,
    ) -> CacheResult<Option<T>> {
        let options = self.merged_options(options);
        let key = normalize_key(name, &options);
        trace!(key = %key, "Cache read");

        match self.backend.get(&key)? {
            Some(payload) => {
                let entry: CacheEntry<T> = decode_payload(&payload, &options)?;
                Ok((!entry.expired()).then(|| entry.into_value()))
            }
            None => Ok(None),
        }
    }

    /// Read a live value, `None` on a miss or on failure.
    pub fn read<T: DeserializeOwned>(
        &self,
        name: impl AsRef<[u8]>,
        options: &CacheOptions,
    ) -> Option<T> {
        rescue_error("read", self.try_read(name, options), None)
    }

    /// Read several live values in one round trip, keyed by logical name.
    pub fn try_read_multi<K, T>(
        &self,
        names: &[K],
        options: &CacheOptions,
    ) -> CacheResult<HashMap<K, T>>
    where
        K: AsRef<[u8]> + Eq + Hash + Clone,
        T: DeserializeOwned,
    {
        if names.is_empty() {
            return Ok(HashMap::new());
        }

        let options = self.merged_options(options);
        let keys_to_names = map_keys_to_names(names, &options);
        let keys: Vec<&str> = keys_to_names.keys().map(String::as_str).collect();
        trace!(keys = ?keys, "Cache read_multi");

        let mut values = HashMap::with_capacity(keys.len());
        for (key, payload) in self.backend.get_multi(&keys)? {
            let Some(name) = keys_to_names.get(&key) else {
                continue;
            };
            let entry: CacheEntry<T> = decode_payload(&payload, &options)?;
            if !entry.expired() {
                values.insert(name.clone(), entry.into_value());
            }
        }
        Ok(values)
    }

    /// Read several live values, empty on failure.
    pub fn read_multi<K, T>(&self, names: &[K], options: &CacheOptions) -> HashMap<K, T>
    where
        K: AsRef<[u8]> + Eq + Hash + Clone,
        T: DeserializeOwned,
    {
        rescue_error(
            "read_multi",
            self.try_read_multi(names, options),
            HashMap::new(),
        )
    }

    /// Store a value unconditionally.
    pub fn try_write<T: Serialize>(
        &self,
        name: impl AsRef<[u8]>,
        value: &T,
        options: &CacheOptions,
    ) -> CacheResult<()> {
        let options = self.merged_options(options);
        let key = normalize_key(name, &options);
        trace!(key = %key, ttl = options.ttl_secs(), "Cache write");

        let payload = encode_payload(value, &options)?;
        self.backend.set(&key, &payload, options.ttl_secs())
    }

    /// Store a value unconditionally. Returns whether the write went through.
    pub fn write<T: Serialize>(
        &self,
        name: impl AsRef<[u8]>,
        value: &T,
        options: &CacheOptions,
    ) -> bool {
        rescue_error(
            "write",
            self.try_write(name, value, options).map(|_| true),
            false,
        )
    }

    /// Remove an entry. Returns whether it existed.
    pub fn try_delete(&self, name: impl AsRef<[u8]>, options: &CacheOptions) -> CacheResult<bool> {
        let key = self.normalize_key(name, options);
        trace!(key = %key, "Cache delete");
        self.backend.delete(&key)
    }

    /// Remove an entry, `false` on a miss or on failure.
    pub fn delete(&self, name: impl AsRef<[u8]>, options: &CacheOptions) -> bool {
        rescue_error("delete", self.try_delete(name, options), false)
    }

    /// Whether a live entry exists.
    pub fn try_exist(&self, name: impl AsRef<[u8]>, options: &CacheOptions) -> CacheResult<bool> {
        Ok(self.try_read::<IgnoredAny>(name, options)?.is_some())
    }

    /// Whether a live entry exists, `false` on failure.
    pub fn exist(&self, name: impl AsRef<[u8]>, options: &CacheOptions) -> bool {
        rescue_error("exist", self.try_exist(name, options), false)
    }

    /// Remove every entry from the backend.
    pub fn clear(&self) -> CacheResult<()> {
        debug!("Flushing cache backend");
        self.backend.flush()
    }

    // ========== Compare-and-Swap ==========

    /// Atomically replace the value stored under `name`.
    ///
    /// `transform` receives the current value and returns the replacement, or
    /// `None` to leave the entry untouched. The backend commits the replacement
    /// only if no other writer stored the key since its read. A missing key is
    /// not created and `transform` is not called.
    ///
    /// `transform` may run more than once if the backend retries on conflict,
    /// so it must not have side effects.
    ///
    /// Returns `Ok(true)` when a new value was committed.
    pub fn try_cas<T, F>(
        &self,
        name: impl AsRef<[u8]>,
        options: &CacheOptions,
        mut transform: F,
    ) -> CacheResult<bool>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut(T) -> Option<T>,
    {
        let options = self.merged_options(options);
        let key = normalize_key(name, &options);
        debug!(operation = "cas", key = %key, ttl = options.ttl_secs(), "Cache cas");

        let mut updater = |payload: &[u8]| -> CacheResult<Option<Vec<u8>>> {
            let entry: CacheEntry<T> = decode_payload(payload, &options)?;
            transform(entry.into_value())
                .map(|value| encode_payload(value, &options))
                .transpose()
        };

        let stored = self.backend.cas(&key, options.ttl_secs(), &mut updater)?;
        if !stored {
            debug!(key = %key, "Cas did not commit");
        }
        Ok(stored)
    }

    /// Atomically replace the value stored under `name`.
    ///
    /// Returns `true` when a new value was committed. `false` covers a missing
    /// key, a declined update, a lost race and backend failures alike; after a
    /// failure the update may or may not have been applied.
    pub fn cas<T, F>(&self, name: impl AsRef<[u8]>, options: &CacheOptions, transform: F) -> bool
    where
        T: Serialize + DeserializeOwned,
        F: FnMut(T) -> Option<T>,
    {
        rescue_error("cas", self.try_cas(name, options, transform), false)
    }

    /// Read several entries with their versions, let `transform` compute new
    /// values, and conditionally replace each one.
    ///
    /// `transform` sees only live entries. Each returned update is written
    /// with the version captured by the read; an update loses if another
    /// writer stored the key in between, and is dropped if the name had no
    /// live read. Keys are swapped independently: there is no atomicity
    /// across keys and no retry.
    ///
    /// An empty `names` returns immediately without touching the backend or
    /// calling `transform`.
    ///
    /// # Examples
    ///
    /// ```
    /// use memstash_cache::{CacheConfig, CacheOptions, InMemoryBackend, MemCacheStore};
    /// use std::collections::HashMap;
    ///
    /// let store = MemCacheStore::new(InMemoryBackend::new(), CacheConfig::in_memory());
    /// let options = CacheOptions::new();
    /// store.write("a", &1u64, &options);
    /// store.write("b", &2u64, &options);
    ///
    /// let report = store
    ///     .try_cas_multi(&["a", "b"], &options, |values: HashMap<&str, u64>| {
    ///         values.into_iter().map(|(name, v)| (name, v * 10)).collect()
    ///     })
    ///     .unwrap();
    ///
    /// assert_eq!(report.committed.len(), 2);
    /// assert_eq!(store.read::<u64>("b", &options), Some(20));
    /// ```
    pub fn try_cas_multi<K, T, F>(
        &self,
        names: &[K],
        options: &CacheOptions,
        transform: F,
    ) -> CacheResult<CasMultiReport<K>>
    where
        K: AsRef<[u8]> + Eq + Hash + Clone,
        T: Serialize + DeserializeOwned,
        F: FnOnce(HashMap<K, T>) -> HashMap<K, T>,
    {
        if names.is_empty() {
            return Ok(CasMultiReport::default());
        }

        let options = self.merged_options(options);
        let ttl = options.ttl_secs();
        let keys_to_names = map_keys_to_names(names, &options);
        let keys: Vec<&str> = keys_to_names.keys().map(String::as_str).collect();
        debug!(operation = "cas_multi", keys = ?keys, ttl = ttl, "Cache cas_multi");

        let raw_values = self.backend.get_multi_cas(&keys)?;

        let mut tokens: HashMap<String, VersionToken> = HashMap::with_capacity(raw_values.len());
        let mut values = HashMap::with_capacity(raw_values.len());
        for (key, (payload, token)) in raw_values {
            let Some(name) = keys_to_names.get(&key) else {
                continue;
            };
            let entry: CacheEntry<T> = decode_payload(&payload, &options)?;
            if entry.expired() {
                trace!(key = %key, "Skipping expired entry");
                continue;
            }
            values.insert(name.clone(), entry.into_value());
            tokens.insert(key, token);
        }

        let updates = transform(values);

        let mut report = CasMultiReport::default();
        for (name, value) in updates {
            let key = normalize_key(&name, &options);
            // Each token backs at most one write.
            let Some(token) = tokens.remove(&key) else {
                debug!(key = %key, "Dropping update without a live read");
                report.dropped.push(name);
                continue;
            };

            let payload = encode_payload(value, &options)?;
            if self.backend.replace_cas(&key, &payload, ttl, token)? {
                report.committed.push(name);
            } else {
                debug!(key = %key, "Cas conflict, update not applied");
                report.conflicted.push(name);
            }
        }

        Ok(report)
    }

    /// Batch compare-and-swap behind the error boundary.
    ///
    /// Returns `false` if any backend call failed. Keys swapped before the
    /// failure stay swapped. Per-key conflicts are not failures.
    pub fn cas_multi<K, T, F>(&self, names: &[K], options: &CacheOptions, transform: F) -> bool
    where
        K: AsRef<[u8]> + Eq + Hash + Clone,
        T: Serialize + DeserializeOwned,
        F: FnOnce(HashMap<K, T>) -> HashMap<K, T>,
    {
        rescue_error(
            "cas_multi",
            self.try_cas_multi(names, options, transform).map(|_| true),
            false,
        )
    }
}

/// Normalized key to logical name. A later name wins if two share a key.
fn map_keys_to_names<K>(names: &[K], options: &CacheOptions) -> HashMap<String, K>
where
    K: AsRef<[u8]> + Clone,
{
    names
        .iter()
        .map(|name| (normalize_key(name, options), name.clone()))
        .collect()
}

pub(crate) fn rescue_error<T>(operation: &'static str, result: CacheResult<T>, fallback: T) -> T {
    result.unwrap_or_else(|error: CacheError| {
        warn!(operation = operation, error = %error, "Cache operation failed");
        fallback
    })
}
