//! Process-local backend with memcached semantics.
//!
//! Every successful write bumps a global version counter, so version tokens
//! behave like memcached CAS unique values. The lock is never held while a
//! caller's updater runs.

use super::{Backend, CasCapable, VersionToken};
use crate::error::CacheResult;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::trace;

#[derive(Debug, Clone)]
struct StoredItem {
    payload: Vec<u8>,
    version: u64,
    expires_at: Option<Instant>,
}

impl StoredItem {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// In-memory backend.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    items: Mutex<HashMap<String, StoredItem>>,
    next_version: AtomicU64,
}

impl InMemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.items.lock().values().filter(|item| item.is_live(now)).count()
    }

    /// Whether no live keys are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn store(&self, items: &mut HashMap<String, StoredItem>, key: &str, payload: &[u8], ttl: u32) {
        let version = self.next_version.fetch_add(1, Ordering::Relaxed) + 1;
        let expires_at = (ttl > 0).then(|| Instant::now() + Duration::from_secs(u64::from(ttl)));
        items.insert(
            key.to_string(),
            StoredItem {
                payload: payload.to_vec(),
                version,
                expires_at,
            },
        );
    }

    fn live_item(items: &mut HashMap<String, StoredItem>, key: &str) -> Option<StoredItem> {
        let now = Instant::now();
        match items.get(key) {
            Some(item) if item.is_live(now) => Some(item.clone()),
            Some(_) => {
                items.remove(key);
                None
            }
            None => None,
        }
    }
}

impl Backend for InMemoryBackend {
    fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut items = self.items.lock();
        Ok(Self::live_item(&mut items, key).map(|item| item.payload))
    }

    fn get_multi(&self, keys: &[&str]) -> CacheResult<HashMap<String, Vec<u8>>> {
        let mut items = self.items.lock();
        Ok(keys
            .iter()
            .filter_map(|key| {
                Self::live_item(&mut items, key).map(|item| (key.to_string(), item.payload))
            })
            .collect())
    }

    fn set(&self, key: &str, payload: &[u8], ttl: u32) -> CacheResult<()> {
        let mut items = self.items.lock();
        self.store(&mut items, key, payload, ttl);
        Ok(())
    }

    fn delete(&self, key: &str) -> CacheResult<bool> {
        let mut items = self.items.lock();
        Ok(Self::live_item(&mut items, key).is_some() && items.remove(key).is_some())
    }

    fn flush(&self) -> CacheResult<()> {
        self.items.lock().clear();
        Ok(())
    }
}

impl CasCapable for InMemoryBackend {
    fn get_multi_cas(&self, keys: &[&str]) -> CacheResult<HashMap<String, (Vec<u8>, VersionToken)>> {
        let mut items = self.items.lock();
        Ok(keys
            .iter()
            .filter_map(|key| {
                Self::live_item(&mut items, key)
                    .map(|item| (key.to_string(), (item.payload, VersionToken(item.version))))
            })
            .collect())
    }

    fn replace_cas(
        &self,
        key: &str,
        payload: &[u8],
        ttl: u32,
        token: VersionToken,
    ) -> CacheResult<bool> {
        let mut items = self.items.lock();
        match Self::live_item(&mut items, key) {
            Some(item) if item.version == token.0 => {
                self.store(&mut items, key, payload, ttl);
                Ok(true)
            }
            Some(item) => {
                trace!(key = %key, expected = token.0, found = item.version, "Version mismatch");
                Ok(false)
            }
            None => {
                trace!(key = %key, "Key vanished before conditional replace");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_delete() {
        let backend = InMemoryBackend::new();
        backend.set("k", b"v", 0).unwrap();
        assert_eq!(backend.get("k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(backend.len(), 1);

        assert!(backend.delete("k").unwrap());
        assert!(!backend.delete("k").unwrap());
        assert!(backend.is_empty());
    }

    #[test]
    fn test_replace_cas_requires_current_version() {
        let backend = InMemoryBackend::new();
        backend.set("k", b"1", 0).unwrap();
        let (_, token) = backend.get_multi_cas(&["k"]).unwrap().remove("k").unwrap();

        backend.set("k", b"2", 0).unwrap();
        assert!(!backend.replace_cas("k", b"3", 0, token).unwrap());
        assert_eq!(backend.get("k").unwrap(), Some(b"2".to_vec()));

        let (_, fresh) = backend.get_multi_cas(&["k"]).unwrap().remove("k").unwrap();
        assert!(backend.replace_cas("k", b"3", 0, fresh).unwrap());
        assert_eq!(backend.get("k").unwrap(), Some(b"3".to_vec()));
    }

    #[test]
    fn test_token_is_single_use() {
        let backend = InMemoryBackend::new();
        backend.set("k", b"1", 0).unwrap();
        let (_, token) = backend.get_multi_cas(&["k"]).unwrap().remove("k").unwrap();

        assert!(backend.replace_cas("k", b"2", 0, token).unwrap());
        assert!(!backend.replace_cas("k", b"3", 0, token).unwrap());
    }

    #[test]
    fn test_replace_cas_on_missing_key() {
        let backend = InMemoryBackend::new();
        assert!(!backend.replace_cas("nope", b"1", 0, VersionToken(1)).unwrap());
        assert!(backend.get("nope").unwrap().is_none());
    }

    #[test]
    fn test_cas_skips_updater_for_missing_key() {
        let backend = InMemoryBackend::new();
        let mut called = false;
        let stored = backend
            .cas("missing", 0, &mut |_| {
                called = true;
                Ok(Some(b"x".to_vec()))
            })
            .unwrap();

        assert!(!stored);
        assert!(!called);
    }

    #[test]
    fn test_cas_detects_interleaved_writer() {
        let backend = InMemoryBackend::new();
        backend.set("k", b"1", 0).unwrap();

        let stored = backend
            .cas("k", 0, &mut |_| {
                backend.set("k", b"other", 0)?;
                Ok(Some(b"mine".to_vec()))
            })
            .unwrap();

        assert!(!stored);
        assert_eq!(backend.get("k").unwrap(), Some(b"other".to_vec()));
    }

    #[test]
    fn test_get_multi_cas_omits_missing_keys() {
        let backend = InMemoryBackend::new();
        backend.set("a", b"1", 0).unwrap();

        let read = backend.get_multi_cas(&["a", "b"]).unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read["a"].0, b"1".to_vec());
    }

    #[test]
    fn test_ttl_expiry() {
        let backend = InMemoryBackend::new();
        backend.set("k", b"v", 1).unwrap();
        assert!(backend.get("k").unwrap().is_some());

        std::thread::sleep(Duration::from_millis(1100));
        assert!(backend.get("k").unwrap().is_none());
    }
}
