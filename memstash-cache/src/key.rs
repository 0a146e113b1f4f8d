//! Normalization of logical cache names into memcached-safe keys.
//!
//! Memcached keys are binary, at most 250 bytes, and must not contain
//! whitespace or control bytes. Normalization works on the raw bytes of the
//! name so the result never depends on how the caller encoded the string:
//!
//! 1. With a namespace configured, the name becomes `"<namespace>:<name>"`.
//! 2. Every byte outside `0x21..=0x7E`, and `%` itself, is replaced by `%XX`
//!    (uppercase hex).
//! 3. A result longer than 250 bytes keeps its first 213 bytes followed by
//!    `:md5:` and the lowercase MD5 hex digest of the full escaped key.

use crate::options::CacheOptions;
use std::fmt::Write;

/// Longest key memcached accepts.
pub const MAX_KEY_LENGTH: usize = 250;

/// Bytes of the escaped key kept in front of the digest suffix.
pub const TRUNCATED_PREFIX_LENGTH: usize = 213;

/// Separator between the truncated prefix and the digest.
pub const DIGEST_SEPARATOR: &str = ":md5:";

/// Whether `byte` may appear unescaped in a memcached key.
pub fn is_permitted_byte(byte: u8) -> bool {
    matches!(byte, 0x21..=0x7E) && byte != b'%'
}

/// Turn a logical name into a memcached-safe key.
///
/// Deterministic and infallible for any input.
///
/// # Examples
///
/// ```
/// use memstash_cache::{normalize_key, CacheOptions};
///
/// let options = CacheOptions::new().with_namespace("app");
/// assert_eq!(normalize_key("user 42", &options), "app:user%2042");
/// ```
pub fn normalize_key(name: impl AsRef<[u8]>, options: &CacheOptions) -> String {
    let name = name.as_ref();
    let escaped = match options.namespace.as_deref() {
        Some(namespace) => {
            let mut escaped = escape(namespace.as_bytes());
            escaped.push(':');
            escaped.push_str(&escape(name));
            escaped
        }
        None => escape(name),
    };

    if escaped.len() > MAX_KEY_LENGTH {
        truncate_with_digest(&escaped)
    } else {
        escaped
    }
}

fn escape(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &byte in bytes {
        if is_permitted_byte(byte) {
            out.push(byte as char);
        } else {
            // Writing to a String cannot fail.
            let _ = write!(out, "%{:02X}", byte);
        }
    }
    out
}

fn truncate_with_digest(escaped: &str) -> String {
    // Escaped keys are pure ASCII, so any byte offset is a char boundary.
    let digest = md5::compute(escaped.as_bytes());
    format!(
        "{}{}{:x}",
        &escaped[..TRUNCATED_PREFIX_LENGTH],
        DIGEST_SEPARATOR,
        digest
    )
}
