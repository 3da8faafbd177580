//! TTL expiry and LRU eviction.
//!
//! Eviction is tier-local: limits are checked against one tier's own entries
//! and only that tier loses entries. Victims are chosen by [`plan_eviction`],
//! a pure function, so the ordering rules can be tested without any tier.
//!
//! Callers hold the tier's gate while these functions run, so a concurrent
//! read never refreshes an entry that is being removed. Between sweeps the
//! manager tracks each tier in a [`TierLedger`] so that a write does not have
//! to list the tier to learn whether it is over a limit.

use crate::backend::{Backend, StorageBackend};
use crate::entry::{StoredEntry, Timestamp};
use crate::error::Result;
use crate::stats::BackendUsage;
use std::collections::HashMap;

/// Per-tier thresholds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EvictionLimits {
    pub max_entries: usize,
    pub max_size_bytes: u64,
}

impl EvictionLimits {
    pub fn exceeded_by(&self, entries: usize, size_bytes: u64) -> bool {
        entries > self.max_entries || size_bytes > self.max_size_bytes
    }
}

/// What eviction needs to know about an entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub key: String,
    pub last_access: Timestamp,
    pub created_at: Timestamp,
    pub size_bytes: u64,
    pub expires_at: Option<Timestamp>,
}

impl Candidate {
    pub fn from_entry(key: &str, entry: &StoredEntry) -> Self {
        let (last_access, created_at) = entry.lru_rank();
        Candidate {
            key: key.to_string(),
            last_access,
            created_at,
            size_bytes: entry.size_bytes,
            expires_at: entry.expires_at(),
        }
    }

    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|exp| now > exp)
    }
}

/// Running count and byte total for one tier.
///
/// Kept by the manager under the tier's gate and updated on every put,
/// delete and clear, so a write only scans the tier when a limit is crossed.
#[derive(Clone, Debug, Default)]
pub struct TierLedger {
    entries: HashMap<String, Candidate>,
    size_bytes: u64,
}

impl TierLedger {
    pub fn from_candidates(candidates: impl IntoIterator<Item = Candidate>) -> Self {
        let mut ledger = TierLedger::default();
        for candidate in candidates {
            ledger.record(candidate);
        }
        ledger
    }

    /// Add or replace the record for `candidate.key`.
    pub fn record(&mut self, candidate: Candidate) {
        self.size_bytes += candidate.size_bytes;
        if let Some(old) = self.entries.insert(candidate.key.clone(), candidate) {
            self.size_bytes = self.size_bytes.saturating_sub(old.size_bytes);
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Candidate> {
        let old = self.entries.remove(key)?;
        self.size_bytes = self.size_bytes.saturating_sub(old.size_bytes);
        Some(old)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.size_bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn usage(&self) -> BackendUsage {
        BackendUsage {
            entries: self.entries.len(),
            size_bytes: self.size_bytes,
        }
    }

    pub fn exceeds(&self, limits: &EvictionLimits) -> bool {
        limits.exceeded_by(self.entries.len(), self.size_bytes)
    }

    fn expired_keys(&self, now: Timestamp) -> Vec<String> {
        self.entries
            .values()
            .filter(|c| c.is_expired_at(now))
            .map(|c| c.key.clone())
            .collect()
    }

    fn candidates(&self) -> Vec<Candidate> {
        self.entries.values().cloned().collect()
    }
}

/// Keys to remove, in removal order, so both limits hold afterwards.
///
/// Oldest `last_access` goes first; ties go to the older `created_at`, then
/// to key order so the plan is deterministic.
pub fn plan_eviction(mut candidates: Vec<Candidate>, limits: &EvictionLimits) -> Vec<String> {
    let mut count = candidates.len();
    let mut size: u64 = candidates.iter().map(|c| c.size_bytes).sum();

    if !limits.exceeded_by(count, size) {
        return Vec::new();
    }

    candidates.sort_by(|a, b| {
        (a.last_access, a.created_at, &a.key).cmp(&(b.last_access, b.created_at, &b.key))
    });

    let mut victims = Vec::new();
    for candidate in candidates {
        if !limits.exceeded_by(count, size) {
            break;
        }
        count -= 1;
        size = size.saturating_sub(candidate.size_bytes);
        victims.push(candidate.key);
    }
    victims
}

/// Outcome of one pass over a tier.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Expired entries removed.
    pub expired: usize,
    /// Live entries removed by LRU.
    pub evicted: usize,
    /// Unreadable entries removed.
    pub corrupt: usize,
    /// Live entries left behind.
    pub usage: BackendUsage,
}

struct Scan {
    entries: Vec<(String, StoredEntry)>,
    corrupt: Vec<String>,
}

async fn scan(backend: &Backend) -> Result<Scan> {
    let keys = backend.keys().await?;
    let mut entries = Vec::with_capacity(keys.len());
    let mut corrupt = Vec::new();

    for key in keys {
        match backend.get(&key).await {
            Ok(Some(entry)) => entries.push((key, entry)),
            Ok(None) => {}
            Err(e) if e.is_corrupt_entry() => corrupt.push(key),
            Err(e) => return Err(e),
        }
    }

    Ok(Scan { entries, corrupt })
}

async fn apply(
    backend: &Backend,
    scan: Scan,
    limits: &EvictionLimits,
    now: Timestamp,
) -> Result<(SweepReport, TierLedger)> {
    let mut report = SweepReport::default();

    for key in &scan.corrupt {
        backend.delete(key).await?;
        report.corrupt += 1;
    }

    let mut live = Vec::with_capacity(scan.entries.len());
    for (key, entry) in scan.entries {
        if entry.is_expired_at(now) {
            backend.delete(&key).await?;
            report.expired += 1;
        } else {
            live.push(Candidate::from_entry(&key, &entry));
        }
    }

    let victims = plan_eviction(live.clone(), limits);
    for key in &victims {
        backend.delete(key).await?;
        debug!("LRU evicted {} from {}", key, backend.id());
    }
    report.evicted = victims.len();

    let ledger =
        TierLedger::from_candidates(live.into_iter().filter(|c| !victims.contains(&c.key)));
    report.usage = ledger.usage();

    Ok((report, ledger))
}

/// Full cleanup pass: drop unreadable and expired entries, then apply LRU.
///
/// Returns the ledger of what is left. Idempotent: a second sweep right
/// after the first removes nothing.
pub async fn sweep(
    backend: &Backend,
    limits: &EvictionLimits,
    now: Timestamp,
) -> Result<(SweepReport, TierLedger)> {
    let scan = scan(backend).await?;
    apply(backend, scan, limits, now).await
}

/// Build a ledger from what the tier holds right now.
///
/// Unreadable entries are left for the next sweep and not counted.
pub async fn load_ledger(backend: &Backend) -> Result<TierLedger> {
    let scan = scan(backend).await?;
    Ok(TierLedger::from_candidates(
        scan.entries
            .iter()
            .map(|(key, entry)| Candidate::from_entry(key, entry)),
    ))
}

/// Post-write check against the ledger; touches the tier only when a limit
/// is exceeded.
///
/// When it does, expired entries are dropped before any live entry is
/// evicted. The ledger follows every delete that succeeds.
pub async fn enforce_limits(
    backend: &Backend,
    limits: &EvictionLimits,
    ledger: &mut TierLedger,
    now: Timestamp,
) -> Result<SweepReport> {
    let mut report = SweepReport::default();

    if ledger.exceeds(limits) {
        for key in ledger.expired_keys(now) {
            backend.delete(&key).await?;
            ledger.remove(&key);
            report.expired += 1;
        }

        let victims = plan_eviction(ledger.candidates(), limits);
        for key in &victims {
            backend.delete(key).await?;
            ledger.remove(key);
            debug!("LRU evicted {} from {}", key, backend.id());
        }
        report.evicted = victims.len();
    }

    report.usage = ledger.usage();
    Ok(report)
}
