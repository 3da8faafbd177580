//! # tier-cache
//!
//! A multi-tier, type-safe caching layer for Rust applications.
//!
//! ## Features
//!
//! - **Four tiers:** in-process memory, quota-bounded durable store
//!   (sled), directory-backed durable store (tokio::fs) and a
//!   session-scoped ephemeral store
//! - **Per-entry TTL** with lazy expiry on read plus a periodic sweep
//! - **LRU eviction** against entry and byte limits, applied per tier
//! - **Read-through fallback:** compute a value on a miss and populate
//!   every requested tier
//! - **Failure tolerant:** one failing tier is logged and skipped; only a
//!   failure on every tier reaches the caller
//! - **Statistics:** hit/miss counts, hit rate, occupancy per tier
//!
//! ## Quick Start
//!
//! ```ignore
//! use tier_cache::{BackendId, CacheConfig, CacheManager, GetOptions, SetOptions};
//! use serde::{Deserialize, Serialize};
//! use std::time::Duration;
//!
//! #[derive(Clone, Serialize, Deserialize)]
//! struct Template {
//!     id: u64,
//!     body: String,
//! }
//!
//! // 1. Build the manager (starts the cleanup scheduler)
//! let cache = CacheManager::builder()
//!     .config(CacheConfig::default().with_durable_async_dir("/var/cache/app"))
//!     .build()
//!     .await?;
//!
//! // 2. Write to memory and the durable-async tier
//! cache
//!     .set(
//!         "template:42",
//!         &template,
//!         SetOptions::default()
//!             .with_ttl(Duration::from_secs(600))
//!             .with_backends(&[BackendId::Memory, BackendId::DurableAsync]),
//!     )
//!     .await?;
//!
//! // 3. Read through: cache first, loader on a miss
//! let template: Option<Template> = cache
//!     .get(
//!         "template:42",
//!         GetOptions::new().with_fallback(|| async { load_template(42).await }),
//!     )
//!     .await?;
//!
//! // 4. Shut down
//! cache.dispose().await;
//! ```
//!
//! Logging goes through the `log` crate (`RUST_LOG=tier_cache=debug`), or
//! through a custom [`observability::LogSink`].

#[macro_use]
extern crate log;

pub mod backend;
pub mod config;
pub mod entry;
pub mod error;
pub mod eviction;
pub mod key;
pub mod manager;
pub mod observability;
pub mod scheduler;
pub mod serialization;
pub mod stats;
pub mod strategy;

// Re-exports for convenience
pub use backend::{BackendId, StorageBackend};
pub use config::CacheConfig;
pub use entry::{CacheEntry, StoredEntry};
pub use error::{Error, Result};
pub use key::CacheKeyBuilder;
pub use manager::{CacheManager, CacheManagerBuilder, CleanupReport, GetOptions, SetOptions};
pub use stats::CacheStats;
pub use strategy::ReadStrategy;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
