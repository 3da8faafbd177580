//! Durable asynchronous tier: one file per key under a root directory.
//!
//! Layout:
//!
//! ```text
//! <root>/schema.json        store marker, written by initialize()
//! <root>/entries/<sha256>   key + encoded StoredEntry
//! <root>/staging/           write-then-rename area
//! ```
//!
//! File names are the hex SHA-256 of the key, so every key gets a 64-byte
//! name whatever its length. The key itself is stored inside the file.
//!
//! Writes land in `staging/` and are renamed into `entries/`, so a reader
//! sees either the old entry or the new one. `clear()` swaps the whole
//! `entries/` directory out before deleting it.
//!
//! Nothing works until [`DurableAsyncBackend::initialize`] succeeds; before
//! that every operation returns `Error::Uninitialized`. Each operation is
//! bounded by the configured deadline and reports `Error::Timeout` past it.

use super::{BackendId, StorageBackend};
use crate::entry::{now_micros, StoredEntry};
use crate::error::{Error, Result};
use crate::serialization::{deserialize_from_cache, serialize_for_cache, CURRENT_SCHEMA_VERSION};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

const SCHEMA_FILE: &str = "schema.json";
const ENTRIES_DIR: &str = "entries";
const STAGING_DIR: &str = "staging";
/// Bumped whenever file naming or file contents change.
const LAYOUT_VERSION: u32 = 2;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct SchemaMarker {
    store: String,
    schema_version: u32,
    // markers written before layouts were versioned read as 0
    #[serde(default)]
    layout: u32,
}

impl SchemaMarker {
    fn current() -> Self {
        SchemaMarker {
            store: "tier-cache".to_string(),
            schema_version: CURRENT_SCHEMA_VERSION,
            layout: LAYOUT_VERSION,
        }
    }
}

struct AsyncStore {
    root: Option<PathBuf>,
    timeout: Duration,
    ready: AtomicBool,
    staging_seq: AtomicU64,
}

/// File-per-key persistent tier with explicit initialization.
#[derive(Clone)]
pub struct DurableAsyncBackend {
    store: Arc<AsyncStore>,
}

fn io_err(e: std::io::Error) -> Error {
    Error::backend_io(BackendId::DurableAsync, e)
}

/// Contents of one entry file.
#[derive(Serialize, Deserialize)]
struct EntryFile {
    key: String,
    entry: StoredEntry,
}

/// Fixed-length file name for any key.
fn file_name(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl DurableAsyncBackend {
    /// Tier rooted at `root`. Call [`initialize`](Self::initialize) before use.
    pub fn new(root: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self::build(Some(root.into()), timeout)
    }

    /// Tier with no storage location; stays uninitialized.
    pub fn unconfigured(timeout: Duration) -> Self {
        Self::build(None, timeout)
    }

    fn build(root: Option<PathBuf>, timeout: Duration) -> Self {
        DurableAsyncBackend {
            store: Arc::new(AsyncStore {
                root,
                timeout,
                ready: AtomicBool::new(false),
                staging_seq: AtomicU64::new(0),
            }),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.store.ready.load(Ordering::Acquire)
    }

    pub fn root(&self) -> Option<&Path> {
        self.store.root.as_deref()
    }

    /// Create the store layout and validate the schema marker.
    ///
    /// A marker from another schema version wipes the stored entries, since
    /// they could not be decoded anyway. Idempotent.
    ///
    /// # Errors
    /// - `Error::ConfigError` if no root directory was configured
    /// - `Error::BackendIo` / `Error::Timeout` on filesystem failure
    pub async fn initialize(&self) -> Result<()> {
        let root = self.store.root.clone().ok_or_else(|| {
            Error::ConfigError("durable-async tier has no directory configured".to_string())
        })?;

        self.bounded(async {
            let entries = root.join(ENTRIES_DIR);
            tokio::fs::create_dir_all(&entries).await.map_err(io_err)?;
            tokio::fs::create_dir_all(root.join(STAGING_DIR))
                .await
                .map_err(io_err)?;

            let marker_path = root.join(SCHEMA_FILE);
            let existing = match tokio::fs::read(&marker_path).await {
                Ok(bytes) => serde_json::from_slice::<SchemaMarker>(&bytes).ok(),
                Err(e) if e.kind() == ErrorKind::NotFound => None,
                Err(e) => return Err(io_err(e)),
            };

            match existing {
                Some(marker) if marker == SchemaMarker::current() => {}
                Some(marker) => {
                    warn!(
                        "Durable-async schema {}/layout {} found, expected {}/{}; dropping stored entries",
                        marker.schema_version, marker.layout, CURRENT_SCHEMA_VERSION, LAYOUT_VERSION
                    );
                    tokio::fs::remove_dir_all(&entries).await.map_err(io_err)?;
                    tokio::fs::create_dir_all(&entries).await.map_err(io_err)?;
                    write_marker(&marker_path).await?;
                }
                None => write_marker(&marker_path).await?,
            }
            Ok(())
        })
        .await?;

        self.store.ready.store(true, Ordering::Release);
        info!("✓ Durable-async tier initialized at {}", root.display());
        Ok(())
    }

    fn ready_root(&self) -> Result<&Path> {
        match (&self.store.root, self.is_initialized()) {
            (Some(root), true) => Ok(root.as_path()),
            _ => Err(Error::Uninitialized(BackendId::DurableAsync)),
        }
    }

    fn entry_path(&self, root: &Path, key: &str) -> PathBuf {
        root.join(ENTRIES_DIR).join(file_name(key))
    }

    async fn bounded<T>(&self, op: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.store.timeout, op).await?
    }

    async fn read_file(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        self.bounded(async {
            match tokio::fs::read(path).await {
                Ok(bytes) => Ok(Some(bytes)),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
                Err(e) => Err(io_err(e)),
            }
        })
        .await
    }
}

async fn write_marker(path: &Path) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(&SchemaMarker::current())?;
    tokio::fs::write(path, bytes).await.map_err(io_err)
}

impl StorageBackend for DurableAsyncBackend {
    fn id(&self) -> BackendId {
        BackendId::DurableAsync
    }

    async fn put(&self, key: &str, entry: StoredEntry) -> Result<()> {
        let root = self.ready_root()?;
        let bytes = serialize_for_cache(&EntryFile {
            key: key.to_string(),
            entry,
        })?;
        let target = self.entry_path(root, key);
        let seq = self.store.staging_seq.fetch_add(1, Ordering::Relaxed);
        let staged = root
            .join(STAGING_DIR)
            .join(format!("{}.{}.tmp", file_name(key), seq));

        self.bounded(async {
            tokio::fs::write(&staged, &bytes).await.map_err(io_err)?;
            if let Err(e) = tokio::fs::rename(&staged, &target).await {
                let _ = tokio::fs::remove_file(&staged).await;
                return Err(io_err(e));
            }
            Ok(())
        })
        .await?;

        debug!("✓ Durable-async PUT {} ({} bytes)", key, bytes.len());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<StoredEntry>> {
        let root = self.ready_root()?;
        let path = self.entry_path(root, key);

        let Some(bytes) = self.read_file(&path).await? else {
            debug!("✓ Durable-async GET {} -> MISS", key);
            return Ok(None);
        };

        let file: EntryFile = deserialize_from_cache(&bytes)?;
        if file.key != key {
            // the file belongs to another key
            debug!("✓ Durable-async GET {} -> MISS (file holds {})", key, file.key);
            return Ok(None);
        }
        debug!("✓ Durable-async GET {} -> HIT", key);
        Ok(Some(file.entry))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let root = self.ready_root()?;
        let path = self.entry_path(root, key);

        self.bounded(async {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(io_err(e)),
            }
        })
        .await?;

        debug!("✓ Durable-async DELETE {}", key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let root = self.ready_root()?;
        let entries = root.join(ENTRIES_DIR);
        let retired = root.join(format!("retired-{}", now_micros()));

        self.bounded(async {
            tokio::fs::rename(&entries, &retired)
                .await
                .map_err(io_err)?;
            tokio::fs::create_dir_all(&entries).await.map_err(io_err)?;
            tokio::fs::remove_dir_all(&retired).await.map_err(io_err)
        })
        .await?;

        warn!("⚠ Durable-async CLEAR executed - all entries dropped");
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let root = self.ready_root()?;
        let entries = root.join(ENTRIES_DIR);

        let paths = self
            .bounded(async {
                let mut dir = tokio::fs::read_dir(&entries).await.map_err(io_err)?;
                let mut paths = Vec::new();
                while let Some(item) = dir.next_entry().await.map_err(io_err)? {
                    paths.push(item.path());
                }
                Ok(paths)
            })
            .await?;

        let mut keys = Vec::with_capacity(paths.len());
        for path in paths {
            let Some(bytes) = self.read_file(&path).await? else {
                continue;
            };
            match deserialize_from_cache::<EntryFile>(&bytes) {
                Ok(file) => keys.push(file.key),
                Err(e) => {
                    warn!(
                        "Durable-async dropping unreadable file {}: {}",
                        path.display(),
                        e
                    );
                    self.bounded(async {
                        match tokio::fs::remove_file(&path).await {
                            Ok(()) => Ok(()),
                            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                            Err(e) => Err(io_err(e)),
                        }
                    })
                    .await?;
                }
            }
        }
        Ok(keys)
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.ready_root().is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(value: &str) -> StoredEntry {
        StoredEntry::from_value(value, None).expect("Failed to build entry")
    }

    #[test]
    fn test_file_name_is_fixed_length() {
        let long = "k".repeat(300);
        for key in ["user:42", "", "päth/with\\slashes", long.as_str()] {
            let name = file_name(key);
            assert_eq!(name.len(), 64);
            assert!(name.bytes().all(|b| b.is_ascii_hexdigit()));
        }
        assert_ne!(file_name("a"), file_name("b"));
    }

    #[tokio::test]
    async fn test_long_key_roundtrip() {
        let dir = tempdir().unwrap();
        let backend = DurableAsyncBackend::new(dir.path(), Duration::from_secs(5));
        backend.initialize().await.unwrap();

        let key = format!("template:{}", "x".repeat(300));
        backend.put(&key, entry("long")).await.unwrap();

        let stored = backend.get(&key).await.unwrap().expect("Entry missing");
        assert_eq!(stored.decode_data::<String>().unwrap(), "long");
        assert_eq!(backend.keys().await.unwrap(), vec![key.clone()]);

        backend.delete(&key).await.unwrap();
        assert!(backend.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_of_other_key_is_a_miss() {
        let dir = tempdir().unwrap();
        let backend = DurableAsyncBackend::new(dir.path(), Duration::from_secs(5));
        backend.initialize().await.unwrap();
        backend.put("a", entry("for a")).await.unwrap();

        let entries = dir.path().join(ENTRIES_DIR);
        std::fs::copy(entries.join(file_name("a")), entries.join(file_name("b"))).unwrap();

        assert!(backend.get("b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stray_files_do_not_break_keys() {
        let dir = tempdir().unwrap();
        let backend = DurableAsyncBackend::new(dir.path(), Duration::from_secs(5));
        backend.initialize().await.unwrap();
        backend.put("real", entry("v")).await.unwrap();

        let stray = dir.path().join(ENTRIES_DIR).join("aéb");
        std::fs::write(&stray, b"not an entry").unwrap();

        assert_eq!(backend.keys().await.unwrap(), vec!["real".to_string()]);
        assert!(!stray.exists());
    }

    #[tokio::test]
    async fn test_uninitialized_refuses_operations() {
        let dir = tempdir().unwrap();
        let backend = DurableAsyncBackend::new(dir.path(), Duration::from_secs(5));

        let err = backend.put("k", entry("v")).await.unwrap_err();
        assert!(matches!(err, Error::Uninitialized(BackendId::DurableAsync)));
        assert!(matches!(
            backend.get("k").await,
            Err(Error::Uninitialized(_))
        ));
        assert!(!backend.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_unconfigured_cannot_initialize() {
        let backend = DurableAsyncBackend::unconfigured(Duration::from_secs(5));
        assert!(matches!(
            backend.initialize().await,
            Err(Error::ConfigError(_))
        ));
        assert!(!backend.is_initialized());
    }

    #[tokio::test]
    async fn test_put_get_delete_after_initialize() {
        let dir = tempdir().unwrap();
        let backend = DurableAsyncBackend::new(dir.path(), Duration::from_secs(5));
        backend.initialize().await.expect("Failed to initialize");

        backend.put("user:1", entry("alice")).await.unwrap();
        let stored = backend.get("user:1").await.unwrap().expect("Entry missing");
        assert_eq!(stored.decode_data::<String>().unwrap(), "alice");
        assert_eq!(backend.keys().await.unwrap(), vec!["user:1".to_string()]);

        backend.delete("user:1").await.unwrap();
        backend.delete("user:1").await.expect("absent delete is ok");
        assert!(backend.get("user:1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent_and_persistent() {
        let dir = tempdir().unwrap();
        {
            let backend = DurableAsyncBackend::new(dir.path(), Duration::from_secs(5));
            backend.initialize().await.unwrap();
            backend.put("kept", entry("value")).await.unwrap();
            backend.initialize().await.unwrap();
        }

        let reopened = DurableAsyncBackend::new(dir.path(), Duration::from_secs(5));
        reopened.initialize().await.unwrap();
        assert!(reopened.get("kept").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_schema_change_drops_entries() {
        let dir = tempdir().unwrap();
        let backend = DurableAsyncBackend::new(dir.path(), Duration::from_secs(5));
        backend.initialize().await.unwrap();
        backend.put("old", entry("value")).await.unwrap();

        let stale = SchemaMarker {
            store: "tier-cache".to_string(),
            schema_version: CURRENT_SCHEMA_VERSION + 1,
            layout: LAYOUT_VERSION,
        };
        std::fs::write(
            dir.path().join(SCHEMA_FILE),
            serde_json::to_vec(&stale).unwrap(),
        )
        .unwrap();

        let reopened = DurableAsyncBackend::new(dir.path(), Duration::from_secs(5));
        reopened.initialize().await.unwrap();
        assert!(reopened.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unversioned_layout_drops_entries() {
        let dir = tempdir().unwrap();
        let backend = DurableAsyncBackend::new(dir.path(), Duration::from_secs(5));
        backend.initialize().await.unwrap();
        // a hex-named file as older stores wrote them
        let legacy = dir.path().join(ENTRIES_DIR).join("6b6579");
        std::fs::write(&legacy, entry("old").encode().unwrap()).unwrap();

        let marker = serde_json::json!({
            "store": "tier-cache",
            "schema_version": CURRENT_SCHEMA_VERSION,
        });
        std::fs::write(
            dir.path().join(SCHEMA_FILE),
            serde_json::to_vec(&marker).unwrap(),
        )
        .unwrap();

        let reopened = DurableAsyncBackend::new(dir.path(), Duration::from_secs(5));
        reopened.initialize().await.unwrap();
        assert!(!legacy.exists());
        assert!(reopened.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_swaps_directory() {
        let dir = tempdir().unwrap();
        let backend = DurableAsyncBackend::new(dir.path(), Duration::from_secs(5));
        backend.initialize().await.unwrap();
        backend.put("a", entry("1")).await.unwrap();
        backend.put("b", entry("2")).await.unwrap();

        backend.clear().await.unwrap();
        assert!(backend.keys().await.unwrap().is_empty());

        backend.put("c", entry("3")).await.unwrap();
        assert_eq!(backend.keys().await.unwrap(), vec!["c".to_string()]);
    }

    #[tokio::test]
    async fn test_overwrite_replaces_entry() {
        let dir = tempdir().unwrap();
        let backend = DurableAsyncBackend::new(dir.path(), Duration::from_secs(5));
        backend.initialize().await.unwrap();

        backend.put("k", entry("first")).await.unwrap();
        backend.put("k", entry("second")).await.unwrap();

        let stored = backend.get("k").await.unwrap().unwrap();
        assert_eq!(stored.decode_data::<String>().unwrap(), "second");
        assert_eq!(backend.keys().await.unwrap().len(), 1);
    }
}
