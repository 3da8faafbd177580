//! Cache key helpers.
//!
//! Keys are opaque to the tiers. These helpers give callers a consistent
//! `namespace:part:part` layout so that [`crate::CacheManager::delete_prefix`]
//! can drop a whole namespace at once.

/// Separator between key parts.
pub const KEY_SEPARATOR: char = ':';

/// Builder for cache keys.
pub struct CacheKeyBuilder;

impl CacheKeyBuilder {
    /// Build `"{prefix}:{id}"`.
    pub fn build_with_prefix(prefix: &str, id: &dyn std::fmt::Display) -> String {
        format!("{}{}{}", prefix, KEY_SEPARATOR, id)
    }

    /// Build composite key from multiple parts.
    pub fn build_composite(parts: &[&str]) -> String {
        let mut buf = [0u8; 4];
        parts.join(&*KEY_SEPARATOR.encode_utf8(&mut buf))
    }

    /// Prefix matching every key in `namespace` (and nothing else).
    ///
    /// `"user"` yields `"user:"`, so `"username:1"` is not matched.
    pub fn namespace_prefix(namespace: &str) -> String {
        format!("{}{}", namespace, KEY_SEPARATOR)
    }

    /// Parse a composite key into parts.
    pub fn parse(key: &str) -> Vec<&str> {
        key.split(KEY_SEPARATOR).collect()
    }
}
