//! Cache entry envelope and payload encoding.

use crate::error::{CacheError, CacheResult};
use crate::options::CacheOptions;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;

/// A cached value together with its expiration marker.
///
/// Entries are stored as JSON. In raw mode only the bare value is stored and
/// the decoded entry never expires. Raw payloads are still JSON, so a string
/// value is written quoted (`"abc"`, not `abc`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    /// The cached value
    pub value: T,

    /// Expiration as milliseconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl<T> CacheEntry<T> {
    /// Create an entry that expires `expires_in` from now.
    ///
    /// `None` or a zero duration means the entry never expires.
    pub fn new(value: T, expires_in: Option<Duration>) -> Self {
        let expires_at = expires_in.filter(|d| !d.is_zero()).map(|d| {
            let millis = i64::try_from(d.as_millis()).unwrap_or(i64::MAX);
            Utc::now().timestamp_millis().saturating_add(millis)
        });
        Self { value, expires_at }
    }

    /// Create an entry with an absolute expiration time.
    pub fn expiring_at(value: T, at: DateTime<Utc>) -> Self {
        Self {
            value,
            expires_at: Some(at.timestamp_millis()),
        }
    }

    /// Whether the expiration marker has passed.
    pub fn expired(&self) -> bool {
        self.expires_at
            .is_some_and(|at| at <= Utc::now().timestamp_millis())
    }

    /// Consume the entry, returning its value.
    pub fn into_value(self) -> T {
        self.value
    }
}

/// Encode `value` into the payload written to the backend.
///
/// Both modes produce JSON; raw mode only drops the envelope.
pub fn encode_payload<T: Serialize>(value: T, options: &CacheOptions) -> CacheResult<Vec<u8>> {
    let payload = if options.is_raw() {
        serde_json::to_vec(&value)?
    } else {
        serde_json::to_vec(&CacheEntry::new(value, options.expires_in))?
    };
    Ok(payload)
}

/// Decode a payload read from the backend.
pub fn decode_payload<T: DeserializeOwned>(
    payload: &[u8],
    options: &CacheOptions,
) -> CacheResult<CacheEntry<T>> {
    let entry = if options.is_raw() {
        serde_json::from_slice(payload).map(|value| CacheEntry {
            value,
            expires_at: None,
        })
    } else {
        serde_json::from_slice(payload)
    };
    entry.map_err(|e| CacheError::Deserialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn test_entry_without_ttl_never_expires() {
        assert!(!CacheEntry::new(1, None).expired());
        assert!(!CacheEntry::new(1, Some(Duration::ZERO)).expired());
    }

    #[test]
    fn test_entry_expiry() {
        assert!(!CacheEntry::new(1, Some(Duration::from_secs(60))).expired());

        let past = Utc::now() - ChronoDuration::seconds(1);
        assert!(CacheEntry::expiring_at(1, past).expired());
    }

    #[test]
    fn test_wrapped_payload_carries_expiry() {
        let options = CacheOptions::new().with_expires_in(Duration::from_secs(60));
        let payload = encode_payload("hello", &options).unwrap();
        let entry: CacheEntry<String> = decode_payload(&payload, &options).unwrap();

        assert_eq!(entry.value, "hello");
        assert!(entry.expires_at.is_some());
    }

    #[test]
    fn test_raw_payload_is_bare_value() {
        let options = CacheOptions::new().with_raw(true);
        let payload = encode_payload(6, &options).unwrap();
        assert_eq!(payload, b"6");

        let entry: CacheEntry<u64> = decode_payload(b"41", &options).unwrap();
        assert_eq!(entry.into_value(), 41);
    }

    #[test]
    fn test_raw_strings_are_json_encoded() {
        let options = CacheOptions::new().with_raw(true);
        let payload = encode_payload("abc", &options).unwrap();
        assert_eq!(payload, b"\"abc\"");

        assert!(decode_payload::<String>(b"abc", &options).is_err());
    }

    #[test]
    fn test_decode_garbage_fails() {
        let result = decode_payload::<u64>(b"{not json", &CacheOptions::new());
        assert!(matches!(result, Err(CacheError::Deserialization(_))));
    }
}
