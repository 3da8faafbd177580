//! Cache manager - the public entry point.
//!
//! Fans operations out over the tiers, applies read-through fallback,
//! triggers eviction and keeps the statistics.

use crate::backend::{
    Backend, BackendId, DurableAsyncBackend, DurableSyncBackend, EphemeralBackend,
    MemoryBackend, StorageBackend,
};
use crate::config::CacheConfig;
use crate::entry::{now_micros, StoredEntry, Timestamp};
use crate::error::{Error, Result};
use crate::eviction::{self, Candidate, EvictionLimits, SweepReport, TierLedger};
use crate::observability::{LogCrateSink, LogSink};
use crate::scheduler::CleanupScheduler;
use crate::stats::{CacheStats, StatsTracker};
use crate::strategy::ReadStrategy;
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const SOURCE: &str = "tier_cache::manager";

type Producer<T> = Box<dyn FnOnce() -> BoxFuture<'static, Result<Option<T>>> + Send>;

/// Options for [`CacheManager::set`].
///
/// # Example
///
/// ```ignore
/// use tier_cache::{BackendId, SetOptions};
/// use std::time::Duration;
///
/// let options = SetOptions::default()
///     .with_ttl(Duration::from_secs(300))
///     .with_backends(&[BackendId::Memory, BackendId::DurableAsync])
///     .with_version("v2")
///     .with_metadata("origin", "template-browser");
/// ```
#[derive(Clone, Debug, Default)]
pub struct SetOptions {
    /// Entry lifetime. `None` falls back to `CacheConfig::default_ttl`.
    pub ttl: Option<Duration>,
    /// Tiers to write. `None` = Memory + DurableSync.
    pub backends: Option<Vec<BackendId>>,
    pub version: Option<String>,
    pub metadata: Option<BTreeMap<String, String>>,
}

impl SetOptions {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_backends(mut self, backends: &[BackendId]) -> Self {
        self.backends = Some(backends.to_vec());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Add one metadata pair.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }
}

/// Options for [`CacheManager::get`].
///
/// # Example
///
/// ```ignore
/// let options = GetOptions::new()
///     .with_backends(&[BackendId::Memory, BackendId::DurableAsync])
///     .with_fallback(|| async { load_template(42).await });
///
/// let template: Option<Template> = manager.get("template:42", options).await?;
/// ```
pub struct GetOptions<T> {
    /// Tiers to read, in order. `None` = Memory + DurableSync.
    pub backends: Option<Vec<BackendId>>,
    pub strategy: ReadStrategy,
    /// When set, entries carrying another version are treated as stale.
    pub version: Option<String>,
    fallback: Option<Producer<T>>,
}

impl<T> Default for GetOptions<T> {
    fn default() -> Self {
        GetOptions {
            backends: None,
            strategy: ReadStrategy::default(),
            version: None,
            fallback: None,
        }
    }
}

impl<T: Send + 'static> GetOptions<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backends(mut self, backends: &[BackendId]) -> Self {
        self.backends = Some(backends.to_vec());
        self
    }

    pub fn with_strategy(mut self, strategy: ReadStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Producer invoked on a full miss. `Ok(None)` means "nothing to cache".
    ///
    /// Its error is returned to the caller as `Error::Fallback`.
    pub fn with_fallback<F, Fut, E>(mut self, producer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<Option<T>, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.fallback = Some(Box::new(move || {
            Box::pin(async move { producer().await.map_err(Error::fallback) })
        }));
        self
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

/// Result of one cleanup pass over every tier.
#[derive(Clone, Debug, Default)]
pub struct CleanupReport {
    pub swept: BTreeMap<BackendId, SweepReport>,
    /// Tiers not ready for use (e.g. uninitialized durable-async).
    pub skipped: Vec<BackendId>,
    pub failed: Vec<(BackendId, Error)>,
    pub finished_at: Timestamp,
}

impl CleanupReport {
    pub fn expired(&self) -> usize {
        self.swept.values().map(|r| r.expired).sum()
    }

    pub fn evicted(&self) -> usize {
        self.swept.values().map(|r| r.evicted).sum()
    }
}

struct Tier {
    backend: Backend,
    // Serializes read-modify-write steps (write-back, eviction, sweep) on this
    // tier and guards its ledger. `None` until the tier is first counted.
    gate: tokio::sync::Mutex<Option<TierLedger>>,
}

impl Tier {
    fn new(backend: impl Into<Backend>) -> Self {
        Tier {
            backend: backend.into(),
            gate: tokio::sync::Mutex::new(None),
        }
    }
}

fn forget(ledger: &mut Option<TierLedger>, key: &str) {
    if let Some(ledger) = ledger.as_mut() {
        ledger.remove(key);
    }
}

pub(crate) struct ManagerInner {
    config: CacheConfig,
    limits: EvictionLimits,
    memory: Tier,
    durable_sync: Tier,
    durable_async: Tier,
    ephemeral: Tier,
    sync_store: DurableSyncBackend,
    async_store: DurableAsyncBackend,
    session: EphemeralBackend,
    stats: StatsTracker,
    sink: Arc<dyn LogSink>,
    scheduler: Mutex<Option<CleanupScheduler>>,
}

/// Multi-tier cache manager.
///
/// Cheap to clone; clones share tiers, statistics and the cleanup scheduler.
/// Construct with [`CacheManager::builder`] and call
/// [`dispose`](CacheManager::dispose) when the owning process shuts down.
///
/// # Example
///
/// ```no_run
/// use tier_cache::{BackendId, CacheConfig, CacheManager, GetOptions, SetOptions};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> tier_cache::Result<()> {
///     let cache = CacheManager::builder()
///         .config(CacheConfig::default().with_max_entries(500))
///         .build()
///         .await?;
///
///     cache
///         .set("greeting", &"hello", SetOptions::default().with_ttl(Duration::from_secs(60)))
///         .await?;
///
///     let value: Option<String> = cache.get("greeting", GetOptions::new()).await?;
///     assert_eq!(value.as_deref(), Some("hello"));
///
///     cache.dispose().await;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct CacheManager {
    inner: Arc<ManagerInner>,
}

/// Builder for [`CacheManager`].
pub struct CacheManagerBuilder {
    config: CacheConfig,
    sink: Arc<dyn LogSink>,
}

impl Default for CacheManagerBuilder {
    fn default() -> Self {
        CacheManagerBuilder {
            config: CacheConfig::default(),
            sink: Arc::new(LogCrateSink),
        }
    }
}

impl CacheManagerBuilder {
    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Route info/warn/error reports to an external sink.
    pub fn log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Open the tiers and start the cleanup scheduler.
    ///
    /// A durable-async tier that fails to initialize is reported to the sink
    /// and left uninitialized; the manager still builds.
    ///
    /// # Errors
    /// - `Error::ConfigError` if the configuration is invalid
    /// - `Error::BackendIo` if the durable-sync tier cannot be opened
    pub async fn build(self) -> Result<CacheManager> {
        let CacheManagerBuilder { config, sink } = self;
        config.validate()?;

        let sync_store = match &config.durable_sync_path {
            Some(path) => DurableSyncBackend::open(path, config.durable_sync_quota_bytes)?,
            None => DurableSyncBackend::temporary(config.durable_sync_quota_bytes)?,
        };

        let async_store = match &config.durable_async_dir {
            Some(dir) => DurableAsyncBackend::new(dir.clone(), config.backend_timeout),
            None => DurableAsyncBackend::unconfigured(config.backend_timeout),
        };

        if config.enable_persistence {
            if async_store.root().is_some() {
                if let Err(e) = async_store.initialize().await {
                    sink.error(
                        "durable-async initialization failed",
                        &json!({ "error": e.to_string() }),
                        SOURCE,
                    );
                }
            } else {
                sink.info(
                    "persistence enabled without a durable-async directory; tier stays uninitialized",
                    &Value::Null,
                    SOURCE,
                );
            }
        }

        let session = EphemeralBackend::new();
        let limits = EvictionLimits {
            max_entries: config.max_entries,
            max_size_bytes: config.max_size_bytes,
        };
        let cleanup_interval = config.cleanup_interval;

        sink.info(
            "cache manager ready",
            &json!({
                "max_entries": config.max_entries,
                "max_size_bytes": config.max_size_bytes,
                "persistence": async_store.is_initialized(),
            }),
            SOURCE,
        );

        let inner = Arc::new(ManagerInner {
            limits,
            memory: Tier::new(MemoryBackend::new()),
            durable_sync: Tier::new(sync_store.clone()),
            durable_async: Tier::new(async_store.clone()),
            ephemeral: Tier::new(session.clone()),
            sync_store,
            async_store,
            session,
            stats: StatsTracker::new(),
            sink,
            scheduler: Mutex::new(None),
            config,
        });

        if !cleanup_interval.is_zero() {
            let scheduler = CleanupScheduler::spawn(Arc::downgrade(&inner), cleanup_interval);
            if let Ok(mut slot) = inner.scheduler.lock() {
                *slot = Some(scheduler);
            }
        }

        Ok(CacheManager { inner })
    }
}

/// Requested tiers in order, duplicates removed.
fn resolve(backends: Option<Vec<BackendId>>) -> Vec<BackendId> {
    let requested = backends.unwrap_or_else(|| BackendId::DEFAULT.to_vec());
    let mut seen = Vec::with_capacity(requested.len());
    for id in requested {
        if !seen.contains(&id) {
            seen.push(id);
        }
    }
    seen
}

impl ManagerInner {
    fn tier(&self, id: BackendId) -> &Tier {
        match id {
            BackendId::Memory => &self.memory,
            BackendId::DurableSync => &self.durable_sync,
            BackendId::DurableAsync => &self.durable_async,
            BackendId::Ephemeral => &self.ephemeral,
        }
    }

    fn warn(&self, message: &str, context: Value) {
        self.sink.warn(message, &context, SOURCE);
    }

    /// Delete without failing the caller; used for expired/corrupt entries.
    async fn discard(
        &self,
        tier: &Tier,
        ledger: &mut Option<TierLedger>,
        key: &str,
        reason: &str,
    ) {
        debug!("Dropping {} from {}: {}", key, tier.backend.id(), reason);
        match tier.backend.delete(key).await {
            Ok(()) => forget(ledger, key),
            Err(e) => self.warn(
                "could not drop entry",
                json!({ "key": key, "backend": tier.backend.id(), "error": e.to_string() }),
            ),
        }
    }

    /// Read one tier; on a live hit, touch the entry and write it back.
    async fn read_tier<T>(
        &self,
        id: BackendId,
        key: &str,
        version: Option<&str>,
    ) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        let tier = self.tier(id);
        let mut ledger = tier.gate.lock().await;

        let mut entry = match tier.backend.get(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return Ok(None),
            Err(e) if e.is_corrupt_entry() => {
                self.discard(tier, &mut ledger, key, &e.to_string()).await;
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if entry.is_expired() {
            self.discard(tier, &mut ledger, key, "expired").await;
            self.stats.record_expirations(1);
            return Ok(None);
        }

        if let Some(wanted) = version {
            if entry.version.as_deref() != Some(wanted) {
                self.discard(tier, &mut ledger, key, "version mismatch").await;
                return Ok(None);
            }
        }

        let value = match entry.decode_data::<T>() {
            Ok(value) => value,
            Err(e) => {
                self.discard(tier, &mut ledger, key, &e.to_string()).await;
                return Ok(None);
            }
        };

        entry.touch();
        let touched = Candidate::from_entry(key, &entry);
        match tier.backend.put(key, entry).await {
            Ok(()) => {
                if let Some(ledger) = ledger.as_mut() {
                    ledger.record(touched);
                }
            }
            Err(e) => self.warn(
                "access write-back failed",
                json!({ "key": key, "backend": id, "error": e.to_string() }),
            ),
        }

        Ok(Some(value))
    }

    /// Put into one tier, then enforce that tier's limits.
    ///
    /// The tier is listed only the first time it is written or when its
    /// ledger says a limit is exceeded.
    async fn write_to(&self, id: BackendId, key: &str, entry: StoredEntry) -> Result<()> {
        let tier = self.tier(id);
        let mut slot = tier.gate.lock().await;

        let written = Candidate::from_entry(key, &entry);
        tier.backend.put(key, entry).await?;

        match slot.as_mut() {
            Some(ledger) => ledger.record(written),
            None => match eviction::load_ledger(&tier.backend).await {
                Ok(loaded) => *slot = Some(loaded),
                Err(e) => {
                    self.warn(
                        "eviction check failed",
                        json!({ "backend": id, "error": e.to_string() }),
                    );
                    return Ok(());
                }
            },
        }
        let Some(ledger) = slot.as_mut() else {
            return Ok(());
        };

        match eviction::enforce_limits(&tier.backend, &self.limits, ledger, now_micros()).await {
            Ok(report) => {
                self.stats.record_expirations(report.expired);
                self.stats.record_evictions(report.evicted);
                if report.evicted > 0 {
                    self.sink.info(
                        "LRU eviction",
                        &json!({ "backend": id, "evicted": report.evicted }),
                        SOURCE,
                    );
                }
            }
            Err(e) => self.warn(
                "eviction check failed",
                json!({ "backend": id, "error": e.to_string() }),
            ),
        }
        Ok(())
    }

    async fn delete_from(&self, id: BackendId, key: &str) -> Result<()> {
        let tier = self.tier(id);
        let mut ledger = tier.gate.lock().await;
        tier.backend.delete(key).await?;
        forget(&mut ledger, key);
        Ok(())
    }

    async fn delete_matching(&self, id: BackendId, prefix: &str) -> Result<usize> {
        let tier = self.tier(id);
        let mut ledger = tier.gate.lock().await;

        let mut removed = 0;
        for key in tier.backend.keys().await? {
            if key.starts_with(prefix) {
                tier.backend.delete(&key).await?;
                forget(&mut ledger, &key);
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn clear_tier(&self, id: BackendId) -> Result<()> {
        let tier = self.tier(id);
        let mut ledger = tier.gate.lock().await;
        tier.backend.clear().await?;
        *ledger = Some(TierLedger::default());
        Ok(())
    }

    /// One sweep over every ready tier.
    pub(crate) async fn run_cleanup(&self) -> CleanupReport {
        let mut report = CleanupReport::default();

        for id in BackendId::ALL {
            let tier = self.tier(id);
            if !tier.backend.health_check().await.unwrap_or(false) {
                report.skipped.push(id);
                continue;
            }

            let mut ledger = tier.gate.lock().await;
            match eviction::sweep(&tier.backend, &self.limits, now_micros()).await {
                Ok((sweep, survivors)) => {
                    *ledger = Some(survivors);
                    self.stats.record_expirations(sweep.expired);
                    self.stats.record_evictions(sweep.evicted);
                    self.stats.set_backend_usage(id, sweep.usage);
                    report.swept.insert(id, sweep);
                }
                Err(e) => {
                    // partial sweep: recount on the next write
                    *ledger = None;
                    self.warn(
                        "cleanup failed",
                        json!({ "backend": id, "error": e.to_string() }),
                    );
                    report.failed.push((id, e));
                }
            }
        }

        report.finished_at = now_micros();
        self.stats.mark_cleanup(report.finished_at);

        if report.expired() + report.evicted() > 0 {
            self.sink.info(
                "cleanup finished",
                &json!({ "expired": report.expired(), "evicted": report.evicted() }),
                SOURCE,
            );
        } else {
            debug!("Cleanup finished: nothing to remove");
        }
        report
    }
}

impl CacheManager {
    pub fn builder() -> CacheManagerBuilder {
        CacheManagerBuilder::default()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Run `op` for every tier with bounded concurrency; results come back
    /// in the order the tiers were given.
    async fn fan_out<R, F, Fut>(&self, backends: &[BackendId], op: F) -> Vec<(BackendId, Result<R>)>
    where
        F: Fn(BackendId) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let mut results: Vec<(usize, BackendId, Result<R>)> =
            stream::iter(backends.iter().copied().enumerate())
                .map(|(i, id)| {
                    let fut = op(id);
                    async move { (i, id, fut.await) }
                })
                .buffer_unordered(self.inner.config.fanout_concurrency)
                .collect()
                .await;

        results.sort_by_key(|(i, _, _)| *i);
        results.into_iter().map(|(_, id, r)| (id, r)).collect()
    }

    /// Log per-tier failures; fail only when every tier failed.
    fn settle<R>(
        &self,
        operation: &str,
        key: &str,
        results: Vec<(BackendId, Result<R>)>,
    ) -> Result<Vec<(BackendId, R)>> {
        let attempted = results.len();
        let mut succeeded = Vec::with_capacity(attempted);
        let mut failed = Vec::new();

        for (id, result) in results {
            match result {
                Ok(value) => succeeded.push((id, value)),
                Err(e) => {
                    self.inner.warn(
                        &format!("{} failed on {}", operation, id),
                        json!({ "key": key, "backend": id, "error": e.to_string() }),
                    );
                    failed.push((id, e));
                }
            }
        }

        if attempted > 0 && failed.len() == attempted {
            let err = Error::AllBackendsFailed(failed);
            self.inner.sink.error(
                &format!("{} failed on every backend", operation),
                &json!({ "key": key, "error": err.to_string() }),
                SOURCE,
            );
            return Err(err);
        }
        Ok(succeeded)
    }

    async fn write_entry(&self, key: &str, entry: StoredEntry, backends: &[BackendId]) -> Result<()> {
        if backends.is_empty() {
            return Ok(());
        }

        let timer = Instant::now();
        let size = entry.size_bytes;
        let results = self
            .fan_out(backends, |id| {
                let entry = entry.clone();
                async move { self.inner.write_to(id, key, entry).await }
            })
            .await;
        self.settle("set", key, results)?;

        self.inner.stats.record_set(size);
        debug!(
            "✓ SET {} ({} bytes, {} backends) in {:?}",
            key,
            size,
            backends.len(),
            timer.elapsed()
        );
        Ok(())
    }

    /// Store `data` under `key` in every requested tier.
    ///
    /// The value is serialized once; each tier receives the same entry.
    ///
    /// # Errors
    ///
    /// - `Error::SerializationError`: `data` cannot be encoded (nothing written)
    /// - `Error::AllBackendsFailed`: no tier accepted the write
    pub async fn set<T>(&self, key: &str, data: &T, options: SetOptions) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let ttl = options.ttl.or(self.inner.config.default_ttl);
        let entry = StoredEntry::from_value(data, ttl)?
            .with_version(options.version)
            .with_metadata(options.metadata);
        let backends = resolve(options.backends);
        self.write_entry(key, entry, &backends).await
    }

    /// Look `key` up tier by tier, falling back on a full miss.
    ///
    /// Returns `Ok(None)` on a miss without fallback (or with a fallback that
    /// produced nothing).
    ///
    /// # Errors
    ///
    /// - `Error::Fallback`: the fallback failed (always propagated)
    /// - `Error::AllBackendsFailed`: every tier read failed and there was
    ///   no fallback to answer instead
    pub async fn get<T>(&self, key: &str, options: GetOptions<T>) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
    {
        let timer = Instant::now();
        let GetOptions {
            backends,
            strategy,
            version,
            fallback,
        } = options;
        let backends = resolve(backends);
        let mut failures = Vec::new();

        match strategy {
            ReadStrategy::Fresh | ReadStrategy::Refresh => {
                for &id in &backends {
                    match self.inner.read_tier::<T>(id, key, version.as_deref()).await {
                        Ok(Some(value)) => {
                            self.inner.stats.record_hit();
                            debug!("✓ GET {} -> HIT on {} in {:?}", key, id, timer.elapsed());
                            return Ok(Some(value));
                        }
                        Ok(None) => {}
                        Err(e) => {
                            self.inner.warn(
                                &format!("get failed on {}", id),
                                json!({ "key": key, "backend": id, "error": e.to_string() }),
                            );
                            failures.push((id, e));
                        }
                    }
                }
            }
            ReadStrategy::Invalidate => {
                let results = self
                    .fan_out(&backends, |id| self.inner.delete_from(id, key))
                    .await;
                // a failed invalidation must not block recomputation
                let _ = self.settle("invalidate", key, results);
            }
            ReadStrategy::Bypass => {}
        }

        self.inner.stats.record_miss();
        debug!("✗ GET {} -> MISS ({} strategy)", key, strategy);

        let producer = match fallback {
            Some(producer) if strategy.allows_fallback() => producer,
            _ => {
                if !backends.is_empty() && failures.len() == backends.len() {
                    return Err(Error::AllBackendsFailed(failures));
                }
                return Ok(None);
            }
        };

        let value = match producer().await {
            Ok(value) => value,
            Err(e) => {
                self.inner.sink.error(
                    "fallback failed",
                    &json!({ "key": key, "error": e.to_string() }),
                    SOURCE,
                );
                return Err(e);
            }
        };

        if let Some(computed) = &value {
            let stored = StoredEntry::from_value(computed, self.inner.config.default_ttl)
                .map(|entry| entry.with_version(version));
            let outcome = match stored {
                Ok(entry) => self.write_entry(key, entry, &backends).await,
                Err(e) => Err(e),
            };
            if let Err(e) = outcome {
                self.inner.warn(
                    "fallback result not cached",
                    json!({ "key": key, "error": e.to_string() }),
                );
            }
        }

        Ok(value)
    }

    /// Remove `key` from the given tiers. Absent keys are not an error.
    ///
    /// # Errors
    /// `Error::AllBackendsFailed` if no tier could be reached.
    pub async fn delete(&self, key: &str, backends: &[BackendId]) -> Result<()> {
        let backends = resolve(Some(backends.to_vec()));
        let results = self
            .fan_out(&backends, |id| self.inner.delete_from(id, key))
            .await;
        self.settle("delete", key, results)?;
        debug!("✓ DELETE {} from {} backends", key, backends.len());
        Ok(())
    }

    /// Remove every key starting with `prefix` from the given tiers.
    ///
    /// Returns the number of entries removed, summed over tiers.
    pub async fn delete_prefix(&self, prefix: &str, backends: &[BackendId]) -> Result<usize> {
        let backends = resolve(Some(backends.to_vec()));
        let results = self
            .fan_out(&backends, |id| self.inner.delete_matching(id, prefix))
            .await;
        let removed: usize = self
            .settle("delete_prefix", prefix, results)?
            .into_iter()
            .map(|(_, n)| n)
            .sum();
        debug!("✓ DELETE_PREFIX {} removed {} entries", prefix, removed);
        Ok(removed)
    }

    /// Empty the given tiers and zero the entry/size totals.
    ///
    /// Hit/miss history survives; see [`reset_stats`](Self::reset_stats).
    pub async fn clear(&self, backends: &[BackendId]) -> Result<()> {
        let backends = resolve(Some(backends.to_vec()));
        let results = self
            .fan_out(&backends, |id| self.inner.clear_tier(id))
            .await;
        let cleared: Vec<BackendId> = self
            .settle("clear", "*", results)?
            .into_iter()
            .map(|(id, _)| id)
            .collect();

        self.inner.stats.reset_totals(&cleared);
        self.inner.sink.info(
            "cache cleared",
            &json!({ "backends": cleared }),
            SOURCE,
        );
        Ok(())
    }

    /// Whether any of the given tiers holds a live entry for `key`.
    ///
    /// Read-only: no access accounting, no statistics, no lazy deletion.
    pub async fn has(&self, key: &str, backends: &[BackendId]) -> bool {
        for &id in backends {
            match self.inner.tier(id).backend.get(key).await {
                Ok(Some(entry)) if !entry.is_expired() => return true,
                Ok(_) => {}
                Err(e) => debug!("HAS {} on {} failed: {}", key, id, e),
            }
        }
        false
    }

    /// Keys currently stored in one tier.
    pub async fn get_keys(&self, backend: BackendId) -> Result<Vec<String>> {
        self.inner.tier(backend).backend.keys().await
    }

    pub fn get_stats(&self) -> CacheStats {
        self.inner.stats.snapshot()
    }

    /// Zero hit/miss/eviction/expiry counters.
    pub fn reset_stats(&self) {
        self.inner.stats.reset_counters();
    }

    /// Run one cleanup sweep now, independent of the scheduler.
    pub async fn cleanup(&self) -> CleanupReport {
        self.inner.run_cleanup().await
    }

    /// Health of every tier; errors count as unhealthy.
    pub async fn health_check(&self) -> BTreeMap<BackendId, bool> {
        let mut health = BTreeMap::new();
        for id in BackendId::ALL {
            let ok = self
                .inner
                .tier(id)
                .backend
                .health_check()
                .await
                .unwrap_or(false);
            health.insert(id, ok);
        }
        health
    }

    /// Initialize the durable-async tier after construction.
    ///
    /// # Errors
    /// Same as [`DurableAsyncBackend::initialize`].
    pub async fn initialize_persistence(&self) -> Result<()> {
        self.inner.async_store.initialize().await
    }

    /// Stop the scheduler, end the ephemeral session and flush durable-sync.
    ///
    /// Safe to call more than once.
    pub async fn dispose(&self) {
        let scheduler = self
            .inner
            .scheduler
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());
        if let Some(scheduler) = scheduler {
            scheduler.stop().await;
        }

        {
            let mut ledger = self.inner.ephemeral.gate.lock().await;
            self.inner.session.end_session();
            *ledger = Some(TierLedger::default());
        }

        if let Err(e) = self.inner.sync_store.flush() {
            self.inner.warn(
                "durable-sync flush failed",
                json!({ "error": e.to_string() }),
            );
        }

        self.inner.sink.info("cache manager disposed", &Value::Null, SOURCE);
    }
}
