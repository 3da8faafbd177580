//! Postcard-based serialization with versioned envelopes.
//!
//! Every value and every persisted entry goes through this module, so the
//! byte form (and therefore `size_bytes` accounting) is identical no matter
//! which tier ends up holding it.
//!
//! # Format
//!
//! ```text
//! ┌─────────────────┬─────────────────┬──────────────────────────┐
//! │  MAGIC (4 bytes)│VERSION (varint) │POSTCARD PAYLOAD (N bytes)│
//! └─────────────────┴─────────────────┴──────────────────────────┘
//!   "TCHE"              u32                postcard::to_allocvec(T)
//! ```
//!
//! # Example
//!
//! ```rust
//! use tier_cache::serialization::{serialize_for_cache, deserialize_from_cache};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Settings {
//!     theme: String,
//!     font_size: u8,
//! }
//!
//! # fn main() -> tier_cache::Result<()> {
//! let settings = Settings { theme: "dark".to_string(), font_size: 14 };
//! let bytes = serialize_for_cache(&settings)?;
//! let restored: Settings = deserialize_from_cache(&bytes)?;
//! assert_eq!(settings, restored);
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Magic header for tier-cache envelopes: b"TCHE"
pub const CACHE_MAGIC: [u8; 4] = *b"TCHE";

/// Current schema version.
///
/// Increment when the layout of [`crate::entry::CacheEntry`] changes. Entries
/// written under another version are dropped on read and recomputed.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Versioned envelope wrapping every serialized payload.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CacheEnvelope<T> {
    /// Magic header: must be b"TCHE"
    pub magic: [u8; 4],
    /// Schema version: must match CURRENT_SCHEMA_VERSION
    pub version: u32,
    /// The wrapped data
    pub payload: T,
}

impl<T> CacheEnvelope<T> {
    /// Create a new envelope with current magic and version.
    pub fn new(payload: T) -> Self {
        Self {
            magic: CACHE_MAGIC,
            version: CURRENT_SCHEMA_VERSION,
            payload,
        }
    }
}

/// Serialize a value with envelope.
///
/// Deterministic: equal values always produce identical bytes.
///
/// # Errors
///
/// Returns `Error::SerializationError` if Postcard serialization fails.
pub fn serialize_for_cache<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let envelope = CacheEnvelope::new(value);
    postcard::to_allocvec(&envelope).map_err(|e| {
        log::error!("Cache serialization failed: {}", e);
        Error::SerializationError(e.to_string())
    })
}

/// Deserialize a value, validating magic and schema version.
///
/// # Errors
///
/// - `Error::InvalidCacheEntry`: Invalid magic header
/// - `Error::VersionMismatch`: Schema version mismatch
/// - `Error::DeserializationError`: Corrupted Postcard payload
pub fn deserialize_from_cache<'de, T: Deserialize<'de>>(bytes: &'de [u8]) -> Result<T> {
    let envelope: CacheEnvelope<T> = postcard::from_bytes(bytes).map_err(|e| {
        log::warn!("Cache deserialization failed: {}", e);
        Error::DeserializationError(e.to_string())
    })?;

    if envelope.magic != CACHE_MAGIC {
        log::warn!(
            "Invalid cache entry: expected magic {:?}, got {:?}",
            CACHE_MAGIC,
            envelope.magic
        );
        return Err(Error::InvalidCacheEntry(format!(
            "Invalid magic: expected {:?}, got {:?}",
            CACHE_MAGIC, envelope.magic
        )));
    }

    if envelope.version != CURRENT_SCHEMA_VERSION {
        log::warn!(
            "Cache version mismatch: expected {}, got {}",
            CURRENT_SCHEMA_VERSION,
            envelope.version
        );
        return Err(Error::VersionMismatch {
            expected: CURRENT_SCHEMA_VERSION,
            found: envelope.version,
        });
    }

    Ok(envelope.payload)
}

/// Byte size a value occupies once serialized.
///
/// This is the number recorded as `size_bytes` on every entry and summed by
/// eviction; it does not depend on any backend's native representation.
pub fn compute_size<T: Serialize + ?Sized>(value: &T) -> Result<u64> {
    serialize_for_cache(value).map(|bytes| bytes.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
    struct Prompt {
        id: u64,
        body: String,
        pinned: bool,
    }

    fn sample() -> Prompt {
        Prompt {
            id: 7,
            body: "summarize this".to_string(),
            pinned: true,
        }
    }

    #[test]
    fn test_roundtrip() {
        let bytes = serialize_for_cache(&sample()).unwrap();
        let restored: Prompt = deserialize_from_cache(&bytes).unwrap();
        assert_eq!(restored, sample());
    }

    #[test]
    fn test_envelope_structure() {
        let bytes = serialize_for_cache(&sample()).unwrap();
        let envelope: CacheEnvelope<Prompt> = postcard::from_bytes(&bytes).unwrap();

        assert_eq!(envelope.magic, CACHE_MAGIC);
        assert_eq!(envelope.version, CURRENT_SCHEMA_VERSION);
        assert_eq!(envelope.payload, sample());
    }

    #[test]
    fn test_invalid_magic_rejected() {
        let mut bytes = serialize_for_cache(&sample()).unwrap();
        bytes[0..4].copy_from_slice(b"XXXX");

        let result: Result<Prompt> = deserialize_from_cache(&bytes);
        match result.unwrap_err() {
            Error::InvalidCacheEntry(_) => {}
            e => panic!("Expected InvalidCacheEntry, got {:?}", e),
        }
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let mut envelope = CacheEnvelope::new(sample());
        envelope.version = 999;
        let bytes = postcard::to_allocvec(&envelope).unwrap();

        let result: Result<Prompt> = deserialize_from_cache(&bytes);
        match result.unwrap_err() {
            Error::VersionMismatch { expected, found } => {
                assert_eq!(expected, CURRENT_SCHEMA_VERSION);
                assert_eq!(found, 999);
            }
            e => panic!("Expected VersionMismatch, got {:?}", e),
        }
    }

    #[test]
    fn test_truncated_payload_rejected() {
        let mut bytes = serialize_for_cache(&sample()).unwrap();
        let half = bytes.len() / 2;
        bytes.truncate(half);

        let result: Result<Prompt> = deserialize_from_cache(&bytes);
        assert!(matches!(result, Err(Error::DeserializationError(_))));
    }

    #[test]
    fn test_deterministic_with_maps() {
        let mut a = BTreeMap::new();
        a.insert("z".to_string(), "1".to_string());
        a.insert("a".to_string(), "2".to_string());
        let mut b = BTreeMap::new();
        b.insert("a".to_string(), "2".to_string());
        b.insert("z".to_string(), "1".to_string());

        assert_eq!(
            serialize_for_cache(&a).unwrap(),
            serialize_for_cache(&b).unwrap()
        );
    }

    #[test]
    fn test_compute_size_matches_serialized_length() {
        let bytes = serialize_for_cache(&sample()).unwrap();
        assert_eq!(compute_size(&sample()).unwrap(), bytes.len() as u64);
    }

    #[test]
    fn test_compute_size_grows_with_payload() {
        let small = compute_size("x").unwrap();
        let large = compute_size(&"x".repeat(1000)).unwrap();
        assert!(large > small);
        assert!(large >= 1000);
    }
}
