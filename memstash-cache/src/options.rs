//! Per-call cache options.

use std::collections::BTreeMap;
use std::time::Duration;

/// Options accepted by every store operation.
///
/// Unset fields fall back to the store's defaults, see [`CacheOptions::merged_with`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheOptions {
    /// Entry time-to-live
    pub expires_in: Option<Duration>,

    /// Store the bare value instead of a wrapped entry. Unset means wrapped.
    pub raw: Option<bool>,

    /// Namespace prepended to the logical name
    pub namespace: Option<String>,

    /// Backend-specific options, passed through untouched
    pub extra: BTreeMap<String, String>,
}

impl CacheOptions {
    /// Create empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the time-to-live.
    pub fn with_expires_in(mut self, ttl: Duration) -> Self {
        self.expires_in = Some(ttl);
        self
    }

    /// Enable or disable raw mode for this call.
    pub fn with_raw(mut self, raw: bool) -> Self {
        self.raw = Some(raw);
        self
    }

    /// Set the namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Add a passthrough option.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Fill unset fields from `defaults`. Values set on `self` win.
    pub fn merged_with(&self, defaults: &CacheOptions) -> CacheOptions {
        let mut extra = defaults.extra.clone();
        extra.extend(self.extra.iter().map(|(k, v)| (k.clone(), v.clone())));

        CacheOptions {
            expires_in: self.expires_in.or(defaults.expires_in),
            raw: self.raw.or(defaults.raw),
            namespace: self.namespace.clone().or_else(|| defaults.namespace.clone()),
            extra,
        }
    }

    /// Whether values are stored bare.
    pub fn is_raw(&self) -> bool {
        self.raw.unwrap_or(false)
    }

    /// TTL in whole seconds as sent to the backend. Zero means no expiry.
    pub fn ttl_secs(&self) -> u32 {
        self.expires_in
            .map(|d| u32::try_from(d.as_secs()).unwrap_or(u32::MAX))
            .unwrap_or(0)
    }
}
