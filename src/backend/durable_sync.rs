//! Durable synchronous tier backed by a sled tree.
//!
//! Every operation completes synchronously. Total stored bytes (keys plus
//! encoded entries) are capped by a quota; a write that would exceed it is
//! refused with `BackendUnavailable` and leaves the tree untouched.

use super::{BackendId, StorageBackend};
use crate::entry::StoredEntry;
use crate::error::{Error, Result};
use std::path::Path;
use std::sync::{Arc, Mutex};

const TREE_NAME: &str = "tier-cache-entries";

struct SyncStore {
    db: sled::Db,
    tree: sled::Tree,
    quota_bytes: u64,
    used_bytes: Mutex<u64>,
}

/// Quota-bounded persistent tier.
///
/// Opened on a path it survives process restarts; [`DurableSyncBackend::temporary`]
/// gives a throwaway store with the same behavior.
#[derive(Clone)]
pub struct DurableSyncBackend {
    store: Arc<SyncStore>,
}

fn io_err(e: sled::Error) -> Error {
    Error::backend_io(BackendId::DurableSync, e)
}

impl DurableSyncBackend {
    /// Open (or create) the store at `path`.
    ///
    /// # Errors
    /// Returns `Error::BackendIo` if sled cannot open the path.
    pub fn open<P: AsRef<Path>>(path: P, quota_bytes: u64) -> Result<Self> {
        let db = sled::open(path.as_ref()).map_err(io_err)?;
        let backend = Self::from_db(db, quota_bytes)?;
        info!(
            "✓ Durable-sync tier opened at {} ({} bytes used of {})",
            path.as_ref().display(),
            backend.used_bytes(),
            quota_bytes
        );
        Ok(backend)
    }

    /// Store that lives only as long as the process.
    pub fn temporary(quota_bytes: u64) -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(io_err)?;
        Self::from_db(db, quota_bytes)
    }

    fn from_db(db: sled::Db, quota_bytes: u64) -> Result<Self> {
        let tree = db.open_tree(TREE_NAME).map_err(io_err)?;

        let mut used = 0u64;
        for item in tree.iter() {
            let (k, v) = item.map_err(io_err)?;
            used += (k.len() + v.len()) as u64;
        }

        Ok(DurableSyncBackend {
            store: Arc::new(SyncStore {
                db,
                tree,
                quota_bytes,
                used_bytes: Mutex::new(used),
            }),
        })
    }

    /// Bytes currently counted against the quota.
    pub fn used_bytes(&self) -> u64 {
        self.store.used_bytes.lock().map(|g| *g).unwrap_or(0)
    }

    pub fn quota_bytes(&self) -> u64 {
        self.store.quota_bytes
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        self.store.db.flush().map_err(io_err)?;
        Ok(())
    }

    fn lock_used(&self) -> Result<std::sync::MutexGuard<'_, u64>> {
        self.store.used_bytes.lock().map_err(|_| Error::BackendUnavailable {
            backend: BackendId::DurableSync,
            reason: "quota accounting lock poisoned".to_string(),
        })
    }
}

impl StorageBackend for DurableSyncBackend {
    fn id(&self) -> BackendId {
        BackendId::DurableSync
    }

    async fn put(&self, key: &str, entry: StoredEntry) -> Result<()> {
        let bytes = entry.encode()?;
        let mut used = self.lock_used()?;

        let previous = self
            .store
            .tree
            .get(key.as_bytes())
            .map_err(io_err)?
            .map(|v| (key.len() + v.len()) as u64)
            .unwrap_or(0);
        let incoming = (key.len() + bytes.len()) as u64;
        let projected = used.saturating_sub(previous) + incoming;

        if projected > self.store.quota_bytes {
            warn!(
                "✗ Durable-sync PUT {} refused: {} bytes would exceed quota of {}",
                key, projected, self.store.quota_bytes
            );
            return Err(Error::BackendUnavailable {
                backend: BackendId::DurableSync,
                reason: format!(
                    "quota exceeded: {} of {} bytes",
                    projected, self.store.quota_bytes
                ),
            });
        }

        self.store
            .tree
            .insert(key.as_bytes(), bytes)
            .map_err(io_err)?;
        *used = projected;

        debug!("✓ Durable-sync PUT {} ({} bytes)", key, incoming);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<StoredEntry>> {
        match self.store.tree.get(key.as_bytes()).map_err(io_err)? {
            Some(bytes) => {
                debug!("✓ Durable-sync GET {} -> HIT", key);
                StoredEntry::decode(&bytes).map(Some)
            }
            None => {
                debug!("✓ Durable-sync GET {} -> MISS", key);
                Ok(None)
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut used = self.lock_used()?;
        if let Some(old) = self.store.tree.remove(key.as_bytes()).map_err(io_err)? {
            *used = used.saturating_sub((key.len() + old.len()) as u64);
        }
        debug!("✓ Durable-sync DELETE {}", key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut used = self.lock_used()?;
        self.store.tree.clear().map_err(io_err)?;
        *used = 0;
        warn!("⚠ Durable-sync CLEAR executed - all entries dropped");
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::with_capacity(self.store.tree.len());
        for item in self.store.tree.iter().keys() {
            let key = item.map_err(io_err)?;
            keys.push(String::from_utf8_lossy(&key).into_owned());
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(value: &str) -> StoredEntry {
        StoredEntry::from_value(value, None).expect("Failed to build entry")
    }

    #[tokio::test]
    async fn test_durable_sync_put_get_delete() {
        let backend = DurableSyncBackend::temporary(1024 * 1024).unwrap();

        backend.put("k", entry("v")).await.expect("Failed to put");
        let stored = backend.get("k").await.unwrap().expect("Entry missing");
        assert_eq!(stored.decode_data::<String>().unwrap(), "v");

        backend.delete("k").await.unwrap();
        assert!(backend.get("k").await.unwrap().is_none());
        assert_eq!(backend.used_bytes(), 0);
    }

    #[tokio::test]
    async fn test_durable_sync_quota_refuses_write() {
        let backend = DurableSyncBackend::temporary(200).unwrap();
        backend.put("small", entry("tiny")).await.unwrap();
        let used = backend.used_bytes();

        let big = "x".repeat(500);
        let err = backend.put("big", entry(&big)).await.unwrap_err();
        assert!(matches!(
            err,
            Error::BackendUnavailable {
                backend: BackendId::DurableSync,
                ..
            }
        ));

        // refused write leaves state as it was
        assert!(backend.get("big").await.unwrap().is_none());
        assert_eq!(backend.used_bytes(), used);
    }

    #[tokio::test]
    async fn test_durable_sync_overwrite_accounts_once() {
        let backend = DurableSyncBackend::temporary(1024 * 1024).unwrap();
        backend.put("k", entry("first")).await.unwrap();
        let after_first = backend.used_bytes();
        backend.put("k", entry("first")).await.unwrap();
        // timestamps encode as varints, so allow a couple of bytes of drift
        assert!(backend.used_bytes() <= after_first + 4);
    }

    #[tokio::test]
    async fn test_durable_sync_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sync");

        {
            let backend = DurableSyncBackend::open(&path, 1024 * 1024).unwrap();
            backend.put("persisted", entry("still here")).await.unwrap();
            backend.flush().unwrap();
        }

        let reopened = DurableSyncBackend::open(&path, 1024 * 1024).unwrap();
        let stored = reopened.get("persisted").await.unwrap().expect("lost on reopen");
        assert_eq!(stored.decode_data::<String>().unwrap(), "still here");
        assert!(reopened.used_bytes() > 0);
    }

    #[tokio::test]
    async fn test_durable_sync_clear_and_keys() {
        let backend = DurableSyncBackend::temporary(1024 * 1024).unwrap();
        backend.put("a", entry("1")).await.unwrap();
        backend.put("b", entry("2")).await.unwrap();

        assert_eq!(
            backend.keys().await.unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );

        backend.clear().await.unwrap();
        assert!(backend.keys().await.unwrap().is_empty());
        assert_eq!(backend.used_bytes(), 0);
    }

    #[tokio::test]
    async fn test_durable_sync_corrupt_bytes_surface_as_error() {
        let backend = DurableSyncBackend::temporary(1024 * 1024).unwrap();
        backend
            .store
            .tree
            .insert("junk", b"not an entry".to_vec())
            .unwrap();

        let err = backend.get("junk").await.unwrap_err();
        assert!(err.is_corrupt_entry());
    }
}
