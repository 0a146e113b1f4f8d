//! Memcached backend over the `memcache` crate.

use super::{memcached_exptime, Backend, CasCapable, VersionToken};
use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use std::collections::HashMap;
use tracing::debug;

/// Payload, flags and CAS unique as returned by `gets`.
type CasValue = (Vec<u8>, u32, Option<u64>);

/// Memcached backend.
///
/// The `memcache` client pools its connections internally and is safe to
/// share between threads. Calls block on the network.
pub struct MemcachedBackend {
    client: memcache::Client,
}

impl MemcachedBackend {
    /// Connect using `config`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use memstash_cache::{CacheConfig, CacheError, MemcachedBackend};
    ///
    /// fn main() -> Result<(), CacheError> {
    ///     let config = CacheConfig::memcached("memcache://localhost:11211");
    ///     let backend = MemcachedBackend::connect(&config)?;
    ///     Ok(())
    /// }
    /// ```
    pub fn connect(config: &CacheConfig) -> CacheResult<Self> {
        let url = config.memcached_url()?;
        let pool_size = u32::try_from(config.max_connections).unwrap_or(u32::MAX);

        let client = memcache::Client::with_pool_size(url.as_str(), pool_size)
            .map_err(|e| CacheError::Connection(format!("Failed to connect: {}", e)))?;
        client.set_read_timeout(Some(config.operation_timeout))?;
        client.set_write_timeout(Some(config.operation_timeout))?;

        debug!(url = %url, pool_size = pool_size, "Connected to memcached");
        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn from_client(client: memcache::Client) -> Self {
        Self { client }
    }
}

fn exptime(ttl: u32) -> u32 {
    memcached_exptime(ttl, chrono::Utc::now().timestamp())
}

impl Backend for MemcachedBackend {
    fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        Ok(self.client.get::<Vec<u8>>(key)?)
    }

    fn get_multi(&self, keys: &[&str]) -> CacheResult<HashMap<String, Vec<u8>>> {
        Ok(self.client.gets::<Vec<u8>>(keys)?)
    }

    fn set(&self, key: &str, payload: &[u8], ttl: u32) -> CacheResult<()> {
        Ok(self.client.set(key, payload, exptime(ttl))?)
    }

    fn delete(&self, key: &str) -> CacheResult<bool> {
        Ok(self.client.delete(key)?)
    }

    fn flush(&self) -> CacheResult<()> {
        Ok(self.client.flush()?)
    }
}

impl CasCapable for MemcachedBackend {
    fn get_multi_cas(&self, keys: &[&str]) -> CacheResult<HashMap<String, (Vec<u8>, VersionToken)>> {
        let values = self.client.gets::<CasValue>(keys)?;

        values
            .into_iter()
            .map(|(key, (payload, _flags, cas))| {
                let cas = cas.ok_or_else(|| {
                    CacheError::Backend(format!("Server returned no CAS unique for {}", key))
                })?;
                Ok((key, (payload, VersionToken(cas))))
            })
            .collect()
    }

    fn replace_cas(
        &self,
        key: &str,
        payload: &[u8],
        ttl: u32,
        token: VersionToken,
    ) -> CacheResult<bool> {
        Ok(self.client.cas(key, payload, exptime(ttl), token.0)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_rejects_bad_url() {
        let config = CacheConfig::memcached("invalid");
        assert!(matches!(
            MemcachedBackend::connect(&config),
            Err(CacheError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_connect_rejects_in_memory_config() {
        assert!(matches!(
            MemcachedBackend::connect(&CacheConfig::in_memory()),
            Err(CacheError::Config(_))
        ));
    }

    #[test]
    #[ignore]
    fn test_live_cas_round_trip() {
        let config = CacheConfig::memcached("localhost:11211");
        let backend = MemcachedBackend::connect(&config).unwrap();

        backend.set("memstash:test:cas", b"1", 60).unwrap();
        let (_, token) = backend
            .get_multi_cas(&["memstash:test:cas"])
            .unwrap()
            .remove("memstash:test:cas")
            .unwrap();

        backend.set("memstash:test:cas", b"2", 60).unwrap();
        assert!(!backend.replace_cas("memstash:test:cas", b"3", 60, token).unwrap());

        backend.delete("memstash:test:cas").unwrap();
    }
}
