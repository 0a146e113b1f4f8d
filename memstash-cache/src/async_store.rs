//! Async facade over [`MemCacheStore`].
//!
//! Backends block on the network, so every call runs on tokio's blocking
//! pool via `spawn_blocking`. A whole operation, read-transform-write
//! included, runs inside one blocking task.

use crate::backend::CasCapable;
use crate::error::{CacheError, CacheResult};
use crate::options::CacheOptions;
use crate::store::{rescue_error, CasMultiReport, MemCacheStore};
use crate::traits::CacheStore;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

/// Async cache store.
///
/// # Examples
///
/// ```
/// use memstash_cache::*;
///
/// #[tokio::main]
/// async fn main() -> Result<(), CacheError> {
///     let store = MemCacheStore::new(InMemoryBackend::new(), CacheConfig::in_memory());
///     let cache = AsyncMemCacheStore::new(store);
///
///     cache.set_json("counter", "5".to_string(), None).await?;
///     assert!(cache.cas("counter", &CacheOptions::new(), |v: u64| Some(v + 1)).await);
///     assert_eq!(cache.get_json("counter").await?, Some("6".to_string()));
///     Ok(())
/// }
/// ```
pub struct AsyncMemCacheStore<B: CasCapable + 'static> {
    inner: Arc<MemCacheStore<B>>,
}

impl<B: CasCapable + 'static> Clone for AsyncMemCacheStore<B> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<B: CasCapable + 'static> AsyncMemCacheStore<B> {
    /// Wrap a store.
    pub fn new(store: MemCacheStore<B>) -> Self {
        Self::from_shared(Arc::new(store))
    }

    /// Wrap a store that is also used synchronously elsewhere.
    pub fn from_shared(store: Arc<MemCacheStore<B>>) -> Self {
        Self { inner: store }
    }

    /// The wrapped synchronous store.
    pub fn store(&self) -> &Arc<MemCacheStore<B>> {
        &self.inner
    }

    async fn run<R, F>(&self, operation: F) -> CacheResult<R>
    where
        R: Send + 'static,
        F: FnOnce(&MemCacheStore<B>) -> CacheResult<R> + Send + 'static,
    {
        let store = self.inner.clone();
        tokio::task::spawn_blocking(move || operation(&store))
            .await
            .map_err(|e| CacheError::Other(format!("Task join error: {}", e)))?
    }

    /// See [`MemCacheStore::try_cas`].
    pub async fn try_cas<T, F>(
        &self,
        name: impl AsRef<[u8]>,
        options: &CacheOptions,
        transform: F,
    ) -> CacheResult<bool>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnMut(T) -> Option<T> + Send + 'static,
    {
        let name = name.as_ref().to_vec();
        let options = options.clone();
        self.run(move |store| store.try_cas(&name, &options, transform))
            .await
    }

    /// See [`MemCacheStore::cas`].
    pub async fn cas<T, F>(&self, name: impl AsRef<[u8]>, options: &CacheOptions, transform: F) -> bool
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnMut(T) -> Option<T> + Send + 'static,
    {
        rescue_error("cas", self.try_cas(name, options, transform).await, false)
    }

    /// See [`MemCacheStore::try_cas_multi`].
    pub async fn try_cas_multi<K, T, F>(
        &self,
        names: Vec<K>,
        options: &CacheOptions,
        transform: F,
    ) -> CacheResult<CasMultiReport<K>>
    where
        K: AsRef<[u8]> + Eq + Hash + Clone + Send + 'static,
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce(HashMap<K, T>) -> HashMap<K, T> + Send + 'static,
    {
        if names.is_empty() {
            return Ok(CasMultiReport::default());
        }

        let options = options.clone();
        self.run(move |store| store.try_cas_multi(&names, &options, transform))
            .await
    }

    /// See [`MemCacheStore::cas_multi`].
    pub async fn cas_multi<K, T, F>(&self, names: Vec<K>, options: &CacheOptions, transform: F) -> bool
    where
        K: AsRef<[u8]> + Eq + Hash + Clone + Send + 'static,
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce(HashMap<K, T>) -> HashMap<K, T> + Send + 'static,
    {
        rescue_error(
            "cas_multi",
            self.try_cas_multi(names, options, transform)
                .await
                .map(|_| true),
            false,
        )
    }
}

#[async_trait]
impl<B: CasCapable + 'static> CacheStore for AsyncMemCacheStore<B> {
    async fn get_json(&self, key: &str) -> CacheResult<Option<String>> {
        let key = key.to_string();
        let value = self
            .run(move |store| store.try_read::<serde_json::Value>(&key, &CacheOptions::new()))
            .await?;
        Ok(value.map(|v| v.to_string()))
    }

    async fn set_json(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<()> {
        let key = key.to_string();
        let value: serde_json::Value = serde_json::from_str(&value)?;
        let options = CacheOptions {
            expires_in: ttl,
            ..CacheOptions::default()
        };
        self.run(move |store| store.try_write(&key, &value, &options))
            .await
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let key = key.to_string();
        self.run(move |store| store.try_delete(&key, &CacheOptions::new()))
            .await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let key = key.to_string();
        self.run(move |store| store.try_exist(&key, &CacheOptions::new()))
            .await
    }

    async fn clear(&self) -> CacheResult<()> {
        self.run(|store| store.clear()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::config::CacheConfig;

    fn cache() -> AsyncMemCacheStore<InMemoryBackend> {
        AsyncMemCacheStore::new(MemCacheStore::new(
            InMemoryBackend::new(),
            CacheConfig::in_memory(),
        ))
    }

    #[tokio::test]
    async fn test_json_round_trip() {
        let cache = cache();
        cache
            .set_json("user:1", r#"{"name":"Alice"}"#.to_string(), None)
            .await
            .unwrap();

        assert_eq!(
            cache.get_json("user:1").await.unwrap(),
            Some(r#"{"name":"Alice"}"#.to_string())
        );
        assert!(cache.exists("user:1").await.unwrap());

        cache.delete("user:1").await.unwrap();
        assert!(!cache.exists("user:1").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_json_rejects_invalid_json() {
        let cache = cache();
        let result = cache.set_json("k", "{nope".to_string(), None).await;
        assert!(matches!(result, Err(CacheError::Serialization(_))));
    }

    #[tokio::test]
    async fn test_async_cas() {
        let cache = cache();
        cache.set_json("counter", "5".to_string(), None).await.unwrap();

        assert!(cache.cas("counter", &CacheOptions::new(), |v: u64| Some(v + 1)).await);
        assert_eq!(cache.get_json("counter").await.unwrap(), Some("6".to_string()));
    }

    #[tokio::test]
    async fn test_async_cas_multi() {
        let cache = cache();
        cache.set_json("a", "1".to_string(), None).await.unwrap();
        cache.set_json("b", "2".to_string(), None).await.unwrap();

        let report = cache
            .try_cas_multi(
                vec!["a".to_string(), "b".to_string()],
                &CacheOptions::new(),
                |values: HashMap<String, u64>| {
                    values.into_iter().map(|(k, v)| (k, v * 2)).collect()
                },
            )
            .await
            .unwrap();

        assert_eq!(report.committed.len(), 2);
        assert_eq!(
            cache.get_many(&["a", "b", "c"]).await.unwrap(),
            vec![Some("2".to_string()), Some("4".to_string()), None]
        );
    }

    #[tokio::test]
    async fn test_delete_many_and_clear() {
        let cache = cache();
        for key in ["a", "b", "c"] {
            cache.set_json(key, "true".to_string(), None).await.unwrap();
        }

        cache.delete_many(&["a", "b"]).await.unwrap();
        assert!(!cache.exists("a").await.unwrap());
        assert!(cache.exists("c").await.unwrap());

        cache.clear().await.unwrap();
        assert!(cache.store().backend().is_empty());
    }
}
