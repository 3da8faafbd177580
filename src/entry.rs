//! Cache entry envelope: value plus timestamps, TTL and access accounting.

use crate::error::Result;
use crate::serialization::{deserialize_from_cache, serialize_for_cache};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Microseconds since the Unix epoch.
pub type Timestamp = u64;

static LAST_TICK: AtomicU64 = AtomicU64::new(0);

/// Current time in microseconds, strictly increasing within the process.
///
/// Two calls never return the same value, so `last_access`/`created_at`
/// give a total LRU order even for operations inside one microsecond.
pub fn now_micros() -> Timestamp {
    let wall = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0);

    let mut prev = LAST_TICK.load(Ordering::Relaxed);
    loop {
        let next = wall.max(prev + 1);
        match LAST_TICK.compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => prev = actual,
        }
    }
}

/// A value wrapped for storage in any tier.
///
/// Invariants:
/// - `last_access >= created_at`
/// - `size_bytes` is the serialized length of `data` when it was written
/// - `ttl == None` never expires by time
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    pub created_at: Timestamp,
    pub ttl: Option<Duration>,
    pub access_count: u64,
    pub last_access: Timestamp,
    pub size_bytes: u64,
    pub version: Option<String>,
    pub metadata: Option<BTreeMap<String, String>>,
}

/// Entry as the backends see it: the value is already serialized.
pub type StoredEntry = CacheEntry<Vec<u8>>;

impl<T> CacheEntry<T> {
    pub fn new(data: T, size_bytes: u64, ttl: Option<Duration>) -> Self {
        let now = now_micros();
        CacheEntry {
            data,
            created_at: now,
            ttl,
            access_count: 0,
            last_access: now,
            size_bytes,
            version: None,
            metadata: None,
        }
    }

    pub fn with_version(mut self, version: Option<String>) -> Self {
        self.version = version;
        self
    }

    pub fn with_metadata(mut self, metadata: Option<BTreeMap<String, String>>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Expired iff a TTL is set and strictly more than `ttl` has passed
    /// between `created_at` and `now`.
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        match self.ttl {
            Some(ttl) => {
                let age = now.saturating_sub(self.created_at) as u128;
                age > ttl.as_micros()
            }
            None => false,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_micros())
    }

    /// Absolute expiry time, if the entry has a TTL.
    pub fn expires_at(&self) -> Option<Timestamp> {
        self.ttl
            .map(|ttl| self.created_at.saturating_add(ttl.as_micros() as u64))
    }

    /// Remaining lifetime; `Some(Duration::ZERO)` once expired.
    pub fn ttl_remaining(&self) -> Option<Duration> {
        self.expires_at().map(|exp| {
            let now = now_micros();
            Duration::from_micros(exp.saturating_sub(now))
        })
    }

    /// Record a read: bump `access_count` and move `last_access` to now.
    pub fn touch(&mut self) {
        self.access_count += 1;
        self.last_access = now_micros().max(self.created_at);
    }

    /// Sort key for LRU eviction: oldest access first, then oldest insert.
    pub fn lru_rank(&self) -> (Timestamp, Timestamp) {
        (self.last_access, self.created_at)
    }
}

impl StoredEntry {
    /// Serialize `value` once and wrap it; `size_bytes` is the byte length.
    ///
    /// # Errors
    ///
    /// Returns `Error::SerializationError` if the value cannot be encoded.
    pub fn from_value<T: Serialize + ?Sized>(value: &T, ttl: Option<Duration>) -> Result<Self> {
        let bytes = serialize_for_cache(value)?;
        let size = bytes.len() as u64;
        Ok(CacheEntry::new(bytes, size, ttl))
    }

    /// Decode the wrapped value.
    pub fn decode_data<T: DeserializeOwned>(&self) -> Result<T> {
        deserialize_from_cache(&self.data)
    }

    /// Encode the whole entry for tiers that persist bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        serialize_for_cache(self)
    }

    /// Decode an entry previously produced by [`StoredEntry::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        deserialize_from_cache(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::compute_size;

    #[test]
    fn test_clock_strictly_increasing() {
        let mut prev = now_micros();
        for _ in 0..1000 {
            let next = now_micros();
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn test_new_entry_invariants() {
        let entry = StoredEntry::from_value(&"hello", None).unwrap();
        assert_eq!(entry.last_access, entry.created_at);
        assert_eq!(entry.access_count, 0);
        assert_eq!(entry.size_bytes, compute_size(&"hello").unwrap());
        assert_eq!(entry.size_bytes, entry.data.len() as u64);
    }

    #[test]
    fn test_no_ttl_never_expires() {
        let entry = CacheEntry::new((), 0, None);
        assert!(!entry.is_expired_at(u64::MAX));
        assert!(entry.ttl_remaining().is_none());
    }

    #[test]
    fn test_expiry_boundary() {
        let mut entry = CacheEntry::new((), 0, Some(Duration::from_millis(100)));
        entry.created_at = 1_000_000;

        // exactly ttl old: still live
        assert!(!entry.is_expired_at(1_100_000));
        assert!(entry.is_expired_at(1_100_001));
        assert_eq!(entry.expires_at(), Some(1_100_000));
    }

    #[test]
    fn test_touch_updates_access() {
        let mut entry = CacheEntry::new(1u8, 1, None);
        let before = entry.last_access;
        entry.touch();
        entry.touch();
        assert_eq!(entry.access_count, 2);
        assert!(entry.last_access > before);
        assert!(entry.last_access >= entry.created_at);
    }

    #[test]
    fn test_lru_rank_orders_by_access_then_creation() {
        let a = CacheEntry::new("a", 1, None);
        let mut b = CacheEntry::new("b", 1, None);
        let c = CacheEntry::new("c", 1, None);
        b.touch();

        let mut entries = [b.clone(), c.clone(), a.clone()];
        entries.sort_by_key(|e| e.lru_rank());
        assert_eq!(entries[0].data, "a");
        assert_eq!(entries[1].data, "c");
        assert_eq!(entries[2].data, "b");
    }

    #[test]
    fn test_stored_entry_encode_decode() {
        let mut meta = BTreeMap::new();
        meta.insert("source".to_string(), "test".to_string());
        let entry = StoredEntry::from_value(&vec![1u32, 2, 3], Some(Duration::from_secs(5)))
            .unwrap()
            .with_version(Some("v2".to_string()))
            .with_metadata(Some(meta));

        let bytes = entry.encode().unwrap();
        let decoded = StoredEntry::decode(&bytes).unwrap();
        assert_eq!(decoded, entry);
        assert_eq!(decoded.decode_data::<Vec<u32>>().unwrap(), vec![1, 2, 3]);
    }
}
