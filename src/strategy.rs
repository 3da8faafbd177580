//! Read strategies for `CacheManager::get`.
//!
//! | Strategy | Live entry | Miss | Use Case |
//! |----------|-----------|------|----------|
//! | **Refresh** | Return | Fallback, then store | Default read-through |
//! | **Fresh** | Return | Return None | Cache-only lookups; fallback ignored |
//! | **Invalidate** | Delete | Fallback, then store | After the source changed |
//! | **Bypass** | Ignore | Fallback, then store | Force recomputation |
//!
//! `Invalidate` and `Bypass` always count as a miss in the statistics, since
//! the value returned did not come from a tier.

/// Strategy controlling how `get` uses the tiers and the fallback.
///
/// # Examples
///
/// ```
/// use tier_cache::strategy::ReadStrategy;
///
/// assert_eq!(ReadStrategy::default(), ReadStrategy::Refresh);
/// assert!(ReadStrategy::Refresh.reads_tiers());
/// assert!(!ReadStrategy::Bypass.reads_tiers());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ReadStrategy {
    /// **Fresh**: tiers only, the fallback is never invoked.
    ///
    /// Flow:
    /// 1. Probe tiers in order
    /// 2. If hit: return cached value
    /// 3. If miss: return None
    Fresh,

    /// **Refresh**: read tiers, fall back on a full miss.
    ///
    /// Flow:
    /// 1. Probe tiers in order
    /// 2. If hit: touch, write back, return
    /// 3. If miss: invoke fallback
    /// 4. Store result in every requested tier
    /// 5. Return value
    #[default]
    Refresh,

    /// **Invalidate**: drop the key from the requested tiers, then recompute.
    ///
    /// Flow:
    /// 1. Delete from tiers
    /// 2. Invoke fallback
    /// 3. Store result
    /// 4. Return value
    Invalidate,

    /// **Bypass**: skip the lookup, recompute, and still store the result.
    ///
    /// Flow:
    /// 1. Invoke fallback
    /// 2. Store result (for later readers)
    /// 3. Return value
    Bypass,
}

impl ReadStrategy {
    /// Whether the tiers are consulted before the fallback.
    pub fn reads_tiers(&self) -> bool {
        matches!(self, ReadStrategy::Fresh | ReadStrategy::Refresh)
    }

    /// Whether a supplied fallback may run on a miss.
    pub fn allows_fallback(&self) -> bool {
        !matches!(self, ReadStrategy::Fresh)
    }
}

impl std::fmt::Display for ReadStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadStrategy::Fresh => write!(f, "Fresh"),
            ReadStrategy::Refresh => write!(f, "Refresh"),
            ReadStrategy::Invalidate => write!(f, "Invalidate"),
            ReadStrategy::Bypass => write!(f, "Bypass"),
        }
    }
}
