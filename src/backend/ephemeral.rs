//! Session-scoped tier.
//!
//! Entries live only for the current session. A session ends when
//! [`EphemeralBackend::end_session`] is called or when the last handle is
//! dropped; either way its entries are discarded without any action from the
//! manager.

use super::{BackendId, StorageBackend};
use crate::entry::StoredEntry;
use crate::error::Result;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

struct SessionState {
    session: AtomicU64,
    store: DashMap<String, StoredEntry>,
}

impl Drop for SessionState {
    fn drop(&mut self) {
        if !self.store.is_empty() {
            debug!(
                "Ephemeral session {} ended with process, {} entries discarded",
                self.session.load(Ordering::Relaxed),
                self.store.len()
            );
        }
    }
}

/// In-process tier whose contents never outlive the session.
#[derive(Clone)]
pub struct EphemeralBackend {
    state: Arc<SessionState>,
}

impl EphemeralBackend {
    pub fn new() -> Self {
        EphemeralBackend {
            state: Arc::new(SessionState {
                session: AtomicU64::new(1),
                store: DashMap::new(),
            }),
        }
    }

    /// Identifier of the running session; increases each time one ends.
    pub fn session_id(&self) -> u64 {
        self.state.session.load(Ordering::Acquire)
    }

    /// Discard every entry and start a fresh session.
    ///
    /// Returns the number of entries discarded.
    pub fn end_session(&self) -> usize {
        let discarded = self.state.store.len();
        self.state.store.clear();
        let ended = self.state.session.fetch_add(1, Ordering::AcqRel);
        info!(
            "Ephemeral session {} ended, {} entries discarded",
            ended, discarded
        );
        discarded
    }

    pub fn len(&self) -> usize {
        self.state.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.store.is_empty()
    }
}

impl Default for EphemeralBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for EphemeralBackend {
    fn id(&self) -> BackendId {
        BackendId::Ephemeral
    }

    async fn put(&self, key: &str, entry: StoredEntry) -> Result<()> {
        self.state.store.insert(key.to_string(), entry);
        debug!("✓ Ephemeral PUT {}", key);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<StoredEntry>> {
        Ok(self.state.store.get(key).map(|e| e.value().clone()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.state.store.remove(key);
        debug!("✓ Ephemeral DELETE {}", key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.state.store.clear();
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.state.store.iter().map(|e| e.key().clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(value: &str) -> StoredEntry {
        StoredEntry::from_value(value, None).expect("Failed to build entry")
    }

    #[tokio::test]
    async fn test_end_session_discards_entries() {
        let backend = EphemeralBackend::new();
        backend.put("draft", entry("unsaved text")).await.unwrap();
        assert_eq!(backend.session_id(), 1);

        let discarded = backend.end_session();
        assert_eq!(discarded, 1);
        assert_eq!(backend.session_id(), 2);
        assert!(backend.get("draft").await.unwrap().is_none());

        // the next session is usable
        backend.put("draft", entry("new")).await.unwrap();
        assert_eq!(backend.len(), 1);
    }

    #[tokio::test]
    async fn test_handles_share_session() {
        let a = EphemeralBackend::new();
        let b = a.clone();
        a.put("k", entry("v")).await.unwrap();
        assert!(b.get("k").await.unwrap().is_some());

        b.end_session();
        assert!(a.is_empty());
        assert_eq!(a.session_id(), b.session_id());
    }

    #[tokio::test]
    async fn test_separate_sessions_are_isolated() {
        let first = EphemeralBackend::new();
        let second = EphemeralBackend::new();
        first.put("k", entry("v")).await.unwrap();
        assert!(second.get("k").await.unwrap().is_none());
        assert_eq!(second.keys().await.unwrap().len(), 0);
    }
}
