//! Cache configuration types.

use crate::error::{CacheError, CacheResult};
use crate::options::CacheOptions;
use std::time::Duration;

/// Cache backend type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheBackend {
    /// Process-local backend
    InMemory,
    /// Memcached backend
    Memcached,
}

impl std::fmt::Display for CacheBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InMemory => write!(f, "InMemory"),
            Self::Memcached => write!(f, "Memcached"),
        }
    }
}

/// Cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Cache backend type
    pub backend: CacheBackend,

    /// Connection URL
    pub url: String,

    /// Namespace prepended to every logical name before normalization
    pub namespace: Option<String>,

    /// Default TTL for cache entries
    pub default_ttl: Option<Duration>,

    /// Connection timeout
    pub connection_timeout: Duration,

    /// Operation timeout
    pub operation_timeout: Duration,

    /// Maximum number of connections (for connection pools)
    pub max_connections: usize,
}

impl CacheConfig {
    /// Create a new Memcached cache configuration.
    ///
    /// # Arguments
    ///
    /// * `url` - Memcached connection URL (e.g., "memcache://localhost:11211")
    ///
    /// # Examples
    ///
    /// ```
    /// use memstash_cache::CacheConfig;
    ///
    /// let config = CacheConfig::memcached("memcache://localhost:11211");
    /// assert_eq!(config.url, "memcache://localhost:11211");
    /// ```
    pub fn memcached(url: impl Into<String>) -> Self {
        Self {
            backend: CacheBackend::Memcached,
            url: url.into(),
            namespace: None,
            default_ttl: None,
            connection_timeout: Duration::from_secs(5),
            operation_timeout: Duration::from_secs(3),
            max_connections: 10,
        }
    }

    /// Create a configuration for the process-local backend.
    pub fn in_memory() -> Self {
        Self {
            backend: CacheBackend::InMemory,
            ..Self::memcached("")
        }
    }

    /// Load a Memcached configuration from environment variables.
    ///
    /// Reads `MEMSTASH_URL`, `MEMSTASH_NAMESPACE`, `MEMSTASH_DEFAULT_TTL`
    /// (seconds) and `MEMSTASH_MAX_CONNECTIONS`. Unparsable numbers are ignored.
    pub fn from_env() -> Self {
        let url = std::env::var("MEMSTASH_URL")
            .unwrap_or_else(|_| "memcache://localhost:11211".to_string());
        let mut config = Self::memcached(url);

        if let Ok(namespace) = std::env::var("MEMSTASH_NAMESPACE") {
            config = config.with_namespace(namespace);
        }

        if let Ok(ttl) = std::env::var("MEMSTASH_DEFAULT_TTL")
            && let Ok(secs) = ttl.parse() {
                config = config.with_default_ttl(Duration::from_secs(secs));
            }

        if let Ok(max) = std::env::var("MEMSTASH_MAX_CONNECTIONS")
            && let Ok(max) = max.parse() {
                config = config.with_max_connections(max);
            }

        config
    }

    /// Set the namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set the default TTL.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Set the connection timeout.
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the operation timeout.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Set the maximum number of connections.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Store-wide default options that per-call options are merged over.
    pub fn default_options(&self) -> CacheOptions {
        CacheOptions {
            expires_in: self.default_ttl,
            namespace: self.namespace.clone(),
            ..CacheOptions::default()
        }
    }

    /// Connection URL in the `memcache://host:port` form the client expects.
    ///
    /// Plain `host:port` is accepted and prefixed. The connection timeout is
    /// carried as the `connect_timeout` query parameter (seconds) unless the
    /// URL already sets one. Fails for non-Memcached configurations.
    pub fn memcached_url(&self) -> CacheResult<String> {
        if self.backend != CacheBackend::Memcached {
            return Err(CacheError::Config(format!(
                "{} configuration has no Memcached URL",
                self.backend
            )));
        }

        let url = &self.url;
        let mut url = if url.starts_with("memcache://") {
            url.to_string()
        } else if url.contains(':') {
            format!("memcache://{}", url)
        } else {
            return Err(CacheError::InvalidUrl(format!(
                "Invalid Memcached URL: {}. Expected format: 'memcache://host:port' or 'host:port'",
                url
            )));
        };

        if !url.contains("connect_timeout=") {
            let separator = if url.contains('?') { '&' } else { '?' };
            url = format!(
                "{}{}connect_timeout={}",
                url,
                separator,
                self.connection_timeout.as_secs_f64()
            );
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memcached_config() {
        let config = CacheConfig::memcached("memcache://localhost:11211");
        assert_eq!(config.backend, CacheBackend::Memcached);
        assert_eq!(config.url, "memcache://localhost:11211");
        assert_eq!(config.max_connections, 10);
    }

    #[test]
    fn test_in_memory_config() {
        let config = CacheConfig::in_memory();
        assert_eq!(config.backend, CacheBackend::InMemory);
        assert!(config.url.is_empty());
        assert_eq!(config.operation_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_config_builder() {
        let config = CacheConfig::memcached("localhost:11211")
            .with_namespace("app")
            .with_default_ttl(Duration::from_secs(300))
            .with_max_connections(20);

        assert_eq!(config.namespace, Some("app".to_string()));
        assert_eq!(config.default_ttl, Some(Duration::from_secs(300)));
        assert_eq!(config.max_connections, 20);
    }

    #[test]
    fn test_default_options() {
        let options = CacheConfig::in_memory()
            .with_namespace("app")
            .with_default_ttl(Duration::from_secs(60))
            .default_options();

        assert_eq!(options.namespace.as_deref(), Some("app"));
        assert_eq!(options.expires_in, Some(Duration::from_secs(60)));
        assert!(!options.is_raw());
    }

    #[test]
    fn test_memcached_url() {
        assert_eq!(
            CacheConfig::memcached("memcache://localhost:11211")
                .memcached_url()
                .unwrap(),
            "memcache://localhost:11211?connect_timeout=5"
        );
        assert_eq!(
            CacheConfig::memcached("localhost:11211")
                .memcached_url()
                .unwrap(),
            "memcache://localhost:11211?connect_timeout=5"
        );
        assert!(CacheConfig::memcached("invalid").memcached_url().is_err());
    }

    #[test]
    fn test_memcached_url_carries_connection_timeout() {
        let url = CacheConfig::memcached("localhost:11211?tcp_nodelay=true")
            .with_connection_timeout(Duration::from_millis(1500))
            .memcached_url()
            .unwrap();
        assert_eq!(url, "memcache://localhost:11211?tcp_nodelay=true&connect_timeout=1.5");

        let url = CacheConfig::memcached("memcache://localhost:11211?connect_timeout=9")
            .with_connection_timeout(Duration::from_secs(1))
            .memcached_url()
            .unwrap();
        assert_eq!(url, "memcache://localhost:11211?connect_timeout=9");
    }

    #[test]
    fn test_in_memory_config_has_no_memcached_url() {
        let result = CacheConfig::in_memory().memcached_url();
        assert!(matches!(result, Err(CacheError::Config(_))));
    }

    #[test]
    fn test_backend_display() {
        assert_eq!(CacheBackend::InMemory.to_string(), "InMemory");
        assert_eq!(CacheBackend::Memcached.to_string(), "Memcached");
    }
}
