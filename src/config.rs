//! Process-wide cache configuration.

use crate::error::{Error, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default entry cap per tier.
const DEFAULT_MAX_ENTRIES: usize = 1000;
/// Default byte cap per tier (50 MiB).
const DEFAULT_MAX_SIZE_BYTES: u64 = 50 * 1024 * 1024;
/// Durable-sync quota, modeled on a typical 5 MiB origin storage limit.
const DEFAULT_SYNC_QUOTA_BYTES: u64 = 5 * 1024 * 1024;

const ENV_PREFIX: &str = "TIER_CACHE_";

/// Configuration fixed at manager construction.
///
/// # Example
///
/// ```
/// use tier_cache::CacheConfig;
/// use std::time::Duration;
///
/// let config = CacheConfig::default()
///     .with_max_entries(500)
///     .with_default_ttl(Some(Duration::from_secs(600)))
///     .with_persistence(false);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// Byte cap applied to each tier by LRU eviction.
    pub max_size_bytes: u64,
    /// Entry cap applied to each tier by LRU eviction.
    pub max_entries: usize,
    /// TTL used when `set` does not give one. `None` = no expiry.
    pub default_ttl: Option<Duration>,
    /// Background sweep period. `Duration::ZERO` disables the scheduler.
    pub cleanup_interval: Duration,
    /// Whether the durable-async tier is initialized at build time.
    pub enable_persistence: bool,
    /// Byte quota of the durable-sync tier.
    pub durable_sync_quota_bytes: u64,
    /// Location of the durable-sync tier. `None` = temporary store.
    pub durable_sync_path: Option<PathBuf>,
    /// Root of the durable-async tier. `None` = tier stays uninitialized.
    pub durable_async_dir: Option<PathBuf>,
    /// Deadline for each durable-async operation.
    pub backend_timeout: Duration,
    /// How many tiers a multi-tier write touches at once.
    pub fanout_concurrency: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            max_size_bytes: DEFAULT_MAX_SIZE_BYTES,
            max_entries: DEFAULT_MAX_ENTRIES,
            default_ttl: Some(Duration::from_secs(60 * 60)),
            cleanup_interval: Duration::from_secs(5 * 60),
            enable_persistence: true,
            durable_sync_quota_bytes: DEFAULT_SYNC_QUOTA_BYTES,
            durable_sync_path: None,
            durable_async_dir: None,
            backend_timeout: Duration::from_secs(5),
            fanout_concurrency: 4,
        }
    }
}

impl CacheConfig {
    /// Defaults overridden by `TIER_CACHE_*` environment variables.
    ///
    /// Recognized: `MAX_ENTRIES`, `MAX_SIZE_BYTES`, `DEFAULT_TTL_SECS`
    /// (`0` = no expiry), `CLEANUP_INTERVAL_SECS`, `ENABLE_PERSISTENCE`,
    /// `SYNC_QUOTA_BYTES`, `SYNC_PATH`, `ASYNC_DIR`, `BACKEND_TIMEOUT_MS`.
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(format!("{}{}", ENV_PREFIX, name)).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = CacheConfig::default();

        if let Some(v) = parse_var(&lookup, "MAX_ENTRIES") {
            config.max_entries = v;
        }
        if let Some(v) = parse_var(&lookup, "MAX_SIZE_BYTES") {
            config.max_size_bytes = v;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "DEFAULT_TTL_SECS") {
            config.default_ttl = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(secs) = parse_var(&lookup, "CLEANUP_INTERVAL_SECS") {
            config.cleanup_interval = Duration::from_secs(secs);
        }
        if let Some(v) = parse_var(&lookup, "ENABLE_PERSISTENCE") {
            config.enable_persistence = v;
        }
        if let Some(v) = parse_var(&lookup, "SYNC_QUOTA_BYTES") {
            config.durable_sync_quota_bytes = v;
        }
        if let Some(path) = lookup("SYNC_PATH") {
            config.durable_sync_path = Some(PathBuf::from(path));
        }
        if let Some(dir) = lookup("ASYNC_DIR") {
            config.durable_async_dir = Some(PathBuf::from(dir));
        }
        if let Some(ms) = parse_var(&lookup, "BACKEND_TIMEOUT_MS") {
            config.backend_timeout = Duration::from_millis(ms);
        }

        config
    }

    /// Check the configuration is usable.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(Error::ConfigError("max_entries must be at least 1".into()));
        }
        if self.max_size_bytes == 0 {
            return Err(Error::ConfigError(
                "max_size_bytes must be at least 1".into(),
            ));
        }
        if self.backend_timeout.is_zero() {
            return Err(Error::ConfigError(
                "backend_timeout must be non-zero".into(),
            ));
        }
        if self.fanout_concurrency == 0 {
            return Err(Error::ConfigError(
                "fanout_concurrency must be at least 1".into(),
            ));
        }
        if self.default_ttl.is_some_and(|ttl| ttl.is_zero()) {
            return Err(Error::ConfigError(
                "default_ttl must be non-zero; use None for no expiry".into(),
            ));
        }
        Ok(())
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn with_max_size_bytes(mut self, max_size_bytes: u64) -> Self {
        self.max_size_bytes = max_size_bytes;
        self
    }

    pub fn with_default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    pub fn with_persistence(mut self, enabled: bool) -> Self {
        self.enable_persistence = enabled;
        self
    }

    pub fn with_durable_sync_quota(mut self, bytes: u64) -> Self {
        self.durable_sync_quota_bytes = bytes;
        self
    }

    pub fn with_durable_sync_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.durable_sync_path = Some(path.into());
        self
    }

    pub fn with_durable_async_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.durable_async_dir = Some(dir.into());
        self
    }

    pub fn with_backend_timeout(mut self, timeout: Duration) -> Self {
        self.backend_timeout = timeout;
        self
    }

    pub fn with_fanout_concurrency(mut self, n: usize) -> Self {
        self.fanout_concurrency = n;
        self
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Ignoring {}{}={:?}: not a valid value", ENV_PREFIX, name, raw);
            None
        }
    }
}
