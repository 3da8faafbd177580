//! Storage tiers behind a uniform contract.

use crate::entry::StoredEntry;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod durable_async;
pub mod durable_sync;
pub mod ephemeral;
pub mod memory;

pub use durable_async::DurableAsyncBackend;
pub use durable_sync::DurableSyncBackend;
pub use ephemeral::EphemeralBackend;
pub use memory::MemoryBackend;

/// Identifies one storage tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendId {
    /// In-process map; fastest, volatile.
    Memory,
    /// Synchronous persistent store with a byte quota.
    DurableSync,
    /// Asynchronous persistent store; needs `initialize()` first.
    DurableAsync,
    /// Session-scoped map, discarded when the session ends.
    Ephemeral,
}

impl BackendId {
    /// Every tier, in default lookup priority.
    pub const ALL: [BackendId; 4] = [
        BackendId::Memory,
        BackendId::DurableSync,
        BackendId::DurableAsync,
        BackendId::Ephemeral,
    ];

    /// Tiers used when an operation does not name any.
    pub const DEFAULT: [BackendId; 2] = [BackendId::Memory, BackendId::DurableSync];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendId::Memory => "memory",
            BackendId::DurableSync => "durable-sync",
            BackendId::DurableAsync => "durable-async",
            BackendId::Ephemeral => "ephemeral",
        }
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for storage tier implementations.
///
/// Tiers differ in latency and durability, never in contract. Only the
/// durable-async tier actually suspends; the others complete synchronously
/// inside the returned future.
///
/// Backends store and return entries verbatim. They do not interpret TTL or
/// access accounting; expiry and eviction belong to the manager.
///
/// **IMPORTANT:** All methods use `&self`. Implementations use interior
/// mutability and are cheap to clone (shared handle).
#[allow(async_fn_in_trait)]
pub trait StorageBackend: Send + Sync + Clone {
    /// Which tier this is.
    fn id(&self) -> BackendId;

    /// Store `entry` under `key`, replacing any previous entry.
    ///
    /// # Errors
    /// - `Error::BackendUnavailable` if the tier refuses the write (quota)
    /// - `Error::Uninitialized` if the tier needs initialization
    /// - `Error::BackendIo` on storage failure
    async fn put(&self, key: &str, entry: StoredEntry) -> Result<()>;

    /// Fetch the entry under `key`, expired or not.
    ///
    /// # Returns
    /// - `Ok(Some(entry))` - Entry present
    /// - `Ok(None)` - Key absent
    ///
    /// # Errors
    /// Persisted tiers return a deserialization-class error for unreadable
    /// bytes; the caller is expected to delete the key.
    async fn get(&self, key: &str) -> Result<Option<StoredEntry>>;

    /// Remove `key`. Absent keys are not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Remove every entry of this tier.
    async fn clear(&self) -> Result<()>;

    /// All keys currently stored (including expired entries not yet swept).
    async fn keys(&self) -> Result<Vec<String>>;

    /// Health check - verify the tier can serve requests.
    ///
    /// # Errors
    /// Returns `Err` if the tier cannot be reached at all
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

/// Any of the four tiers, dispatched statically.
#[derive(Clone)]
pub enum Backend {
    Memory(MemoryBackend),
    DurableSync(DurableSyncBackend),
    DurableAsync(DurableAsyncBackend),
    Ephemeral(EphemeralBackend),
}

macro_rules! dispatch {
    ($self:ident, $b:ident => $call:expr) => {
        match $self {
            Backend::Memory($b) => $call,
            Backend::DurableSync($b) => $call,
            Backend::DurableAsync($b) => $call,
            Backend::Ephemeral($b) => $call,
        }
    };
}

impl StorageBackend for Backend {
    fn id(&self) -> BackendId {
        dispatch!(self, b => b.id())
    }

    async fn put(&self, key: &str, entry: StoredEntry) -> Result<()> {
        dispatch!(self, b => b.put(key, entry).await)
    }

    async fn get(&self, key: &str) -> Result<Option<StoredEntry>> {
        dispatch!(self, b => b.get(key).await)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        dispatch!(self, b => b.delete(key).await)
    }

    async fn clear(&self) -> Result<()> {
        dispatch!(self, b => b.clear().await)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        dispatch!(self, b => b.keys().await)
    }

    async fn health_check(&self) -> Result<bool> {
        dispatch!(self, b => b.health_check().await)
    }
}

impl From<MemoryBackend> for Backend {
    fn from(b: MemoryBackend) -> Self {
        Backend::Memory(b)
    }
}

impl From<DurableSyncBackend> for Backend {
    fn from(b: DurableSyncBackend) -> Self {
        Backend::DurableSync(b)
    }
}

impl From<DurableAsyncBackend> for Backend {
    fn from(b: DurableAsyncBackend) -> Self {
        Backend::DurableAsync(b)
    }
}

impl From<EphemeralBackend> for Backend {
    fn from(b: EphemeralBackend) -> Self {
        Backend::Ephemeral(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_id_display() {
        assert_eq!(BackendId::Memory.to_string(), "memory");
        assert_eq!(BackendId::DurableSync.to_string(), "durable-sync");
        assert_eq!(BackendId::DurableAsync.to_string(), "durable-async");
        assert_eq!(BackendId::Ephemeral.to_string(), "ephemeral");
    }

    #[test]
    fn test_backend_id_serde_kebab_case() {
        let json = serde_json::to_string(&BackendId::DurableSync).unwrap();
        assert_eq!(json, "\"durable-sync\"");
    }

    #[tokio::test]
    async fn test_dispatch_reaches_variant() {
        let memory = MemoryBackend::new();
        let backend: Backend = memory.clone().into();
        assert_eq!(backend.id(), BackendId::Memory);

        let entry = StoredEntry::from_value(&"v", None).unwrap();
        backend.put("k", entry).await.unwrap();

        assert!(memory.get("k").await.unwrap().is_some());
        assert_eq!(backend.keys().await.unwrap(), vec!["k".to_string()]);
        assert!(backend.health_check().await.unwrap());
    }
}
