//! Backend connection traits.
//!
//! A backend moves opaque payloads to and from already-normalized keys. The
//! store layers key normalization, entry encoding and the error boundary on
//! top of it.

use crate::error::CacheResult;
use std::collections::HashMap;

pub mod memory;

#[cfg(feature = "memcached")]
pub mod memcached;

pub use memory::InMemoryBackend;

#[cfg(feature = "memcached")]
pub use memcached::MemcachedBackend;

/// Longest exptime memcached treats as relative seconds.
///
/// Larger values are read as an absolute Unix timestamp.
pub const MAX_RELATIVE_EXPTIME: u32 = 60 * 60 * 24 * 30;

/// Convert a TTL in seconds to the exptime memcached expects.
///
/// TTLs above [`MAX_RELATIVE_EXPTIME`] become `now_unix + ttl`, saturating at
/// `u32::MAX`. Zero stays zero (no expiry).
pub fn memcached_exptime(ttl: u32, now_unix: i64) -> u32 {
    if ttl <= MAX_RELATIVE_EXPTIME {
        return ttl;
    }
    let absolute = now_unix.max(0).saturating_add(i64::from(ttl));
    u32::try_from(absolute).unwrap_or(u32::MAX)
}

/// Version of a key as captured by a read.
///
/// Stale as soon as any other writer stores the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VersionToken(pub u64);

/// Maps the current payload of a key to its replacement.
///
/// `Ok(None)` leaves the stored payload untouched.
pub type Updater<'a> = dyn FnMut(&[u8]) -> CacheResult<Option<Vec<u8>>> + 'a;

/// Plain key/value commands every backend supports.
///
/// TTLs are whole seconds; zero means the entry does not expire.
pub trait Backend: Send + Sync {
    /// Fetch the payload stored under `key`.
    fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Fetch several keys in one round trip. Missing keys are absent from the map.
    fn get_multi(&self, keys: &[&str]) -> CacheResult<HashMap<String, Vec<u8>>>;

    /// Store `payload` unconditionally.
    fn set(&self, key: &str, payload: &[u8], ttl: u32) -> CacheResult<()>;

    /// Remove `key`. Returns whether it existed.
    fn delete(&self, key: &str) -> CacheResult<bool>;

    /// Remove every key.
    fn flush(&self) -> CacheResult<()>;
}

/// Compare-and-swap commands.
pub trait CasCapable: Backend {
    /// Read every key together with its current version token.
    fn get_multi_cas(&self, keys: &[&str]) -> CacheResult<HashMap<String, (Vec<u8>, VersionToken)>>;

    /// Store `payload` only if `key` is still at version `token`.
    ///
    /// Returns `Ok(false)` when the key changed or disappeared since the read.
    fn replace_cas(
        &self,
        key: &str,
        payload: &[u8],
        ttl: u32,
        token: VersionToken,
    ) -> CacheResult<bool>;

    /// Atomically read `key`, pass its payload through `updater` and commit the
    /// result if nothing else wrote the key in between.
    ///
    /// Returns `Ok(false)` without calling `updater` when the key is missing,
    /// and `Ok(false)` when the write lost a race or `updater` declined to write.
    /// Implementations that retry on conflict may call `updater` more than once.
    fn cas(&self, key: &str, ttl: u32, updater: &mut Updater<'_>) -> CacheResult<bool> {
        let mut read = self.get_multi_cas(&[key])?;
        let Some((payload, token)) = read.remove(key) else {
            return Ok(false);
        };

        match updater(&payload)? {
            Some(replacement) => self.replace_cas(key, &replacement, ttl, token),
            None => Ok(false),
        }
    }
}
