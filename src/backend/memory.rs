//! In-process memory tier.
//!
//! Uses DashMap for concurrent access with per-key sharding. Size and count
//! limits are applied by the manager's eviction engine, not here.

use super::{BackendId, StorageBackend};
use crate::entry::StoredEntry;
use crate::error::Result;
use dashmap::DashMap;
use std::sync::Arc;

/// Thread-safe in-memory tier.
///
/// Cloning shares the underlying map.
///
/// # Example
///
/// ```no_run
/// use tier_cache::backend::{MemoryBackend, StorageBackend};
/// use tier_cache::entry::StoredEntry;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let backend = MemoryBackend::new();
///
///     backend.put("greeting", StoredEntry::from_value(&"hello", None)?).await?;
///     let entry = backend.get("greeting").await?;
///     assert!(entry.is_some());
///
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct MemoryBackend {
    store: Arc<DashMap<String, StoredEntry>>,
}

impl MemoryBackend {
    /// Create a new, empty memory tier.
    pub fn new() -> Self {
        MemoryBackend {
            store: Arc::new(DashMap::new()),
        }
    }

    /// Number of entries, expired ones included.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for MemoryBackend {
    fn id(&self) -> BackendId {
        BackendId::Memory
    }

    async fn put(&self, key: &str, entry: StoredEntry) -> Result<()> {
        match entry.ttl {
            Some(ttl) => debug!("✓ Memory PUT {} (TTL: {:?})", key, ttl),
            None => debug!("✓ Memory PUT {}", key),
        }
        self.store.insert(key.to_string(), entry);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<StoredEntry>> {
        let entry = self.store.get(key).map(|e| e.value().clone());
        if entry.is_some() {
            debug!("✓ Memory GET {} -> HIT", key);
        } else {
            debug!("✓ Memory GET {} -> MISS", key);
        }
        Ok(entry)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.store.remove(key);
        debug!("✓ Memory DELETE {}", key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let count = self.store.len();
        self.store.clear();
        warn!("⚠ Memory CLEAR executed - {} entries dropped", count);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.store.iter().map(|e| e.key().clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn entry(value: &str) -> StoredEntry {
        StoredEntry::from_value(value, None).expect("Failed to build entry")
    }

    #[tokio::test]
    async fn test_memory_put_get() {
        let backend = MemoryBackend::new();

        backend
            .put("key1", entry("value1"))
            .await
            .expect("Failed to put");

        let result = backend.get("key1").await.expect("Failed to get");
        let stored = result.expect("Entry missing");
        assert_eq!(stored.decode_data::<String>().unwrap(), "value1");
    }

    #[tokio::test]
    async fn test_memory_miss() {
        let backend = MemoryBackend::new();
        let result = backend.get("nonexistent").await.expect("Failed to get");
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_memory_delete_absent_is_ok() {
        let backend = MemoryBackend::new();
        backend.put("key1", entry("v")).await.unwrap();
        backend.delete("key1").await.expect("Failed to delete");
        backend.delete("key1").await.expect("Second delete should not fail");
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_memory_returns_expired_entries_verbatim() {
        let backend = MemoryBackend::new();
        let short = StoredEntry::from_value("soon", Some(Duration::from_millis(10))).unwrap();
        backend.put("k", short).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        let stored = backend.get("k").await.unwrap().expect("tier keeps it");
        assert!(stored.is_expired());
    }

    #[tokio::test]
    async fn test_memory_clear_and_keys() {
        let backend = MemoryBackend::new();
        backend.put("a", entry("1")).await.unwrap();
        backend.put("b", entry("2")).await.unwrap();

        let mut keys = backend.keys().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);

        backend.clear().await.expect("Failed to clear");
        assert_eq!(backend.len(), 0);
    }

    #[tokio::test]
    async fn test_memory_clone_shares_store() {
        let backend1 = MemoryBackend::new();
        backend1.put("key", entry("value")).await.unwrap();

        let backend2 = backend1.clone();
        assert!(backend2.get("key").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_memory_concurrent_puts() {
        let backend = MemoryBackend::new();
        let mut handles = vec![];

        for i in 0..10 {
            let b = backend.clone();
            handles.push(tokio::spawn(async move {
                let key = format!("key_{}", i);
                b.put(&key, entry(&format!("value_{}", i)))
                    .await
                    .expect("Failed to put");
            }));
        }

        for handle in handles {
            handle.await.expect("Task failed");
        }

        assert_eq!(backend.len(), 10);
    }
}
