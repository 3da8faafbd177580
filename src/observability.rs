//! Logging sink the manager reports through.
//!
//! The analytics/logging module of the host application is an external
//! collaborator. The manager only needs three calls from it:
//! `info/warn/error(message, context, source)`.
//!
//! Implement [`LogSink`] to forward these to your own analytics pipeline:
//!
//! ```ignore
//! use tier_cache::observability::LogSink;
//! use serde_json::Value;
//!
//! struct Analytics;
//!
//! impl LogSink for Analytics {
//!     fn warn(&self, message: &str, context: &Value, source: &str) {
//!         // analytics.track("cache_warning", message, context, source)
//!     }
//!     // info/error keep their default log-crate forwarding
//! }
//!
//! // let manager = CacheManager::builder()
//! //     .log_sink(Arc::new(Analytics))
//! //     .build()
//! //     .await?;
//! ```
//!
//! Default behavior (if not overridden) forwards to the `log` crate with
//! `source` as the log target, so `RUST_LOG=tier_cache=debug` shows it.

use serde_json::Value;

/// Trait for the external logging sink.
pub trait LogSink: Send + Sync {
    /// Informational event (initialization, cleanup summaries).
    fn info(&self, message: &str, context: &Value, source: &str) {
        if context.is_null() {
            log::info!(target: source, "{}", message);
        } else {
            log::info!(target: source, "{} {}", message, context);
        }
    }

    /// Tolerated failure (one backend failed, others continued).
    fn warn(&self, message: &str, context: &Value, source: &str) {
        if context.is_null() {
            log::warn!(target: source, "{}", message);
        } else {
            log::warn!(target: source, "{} {}", message, context);
        }
    }

    /// Failure surfaced to the caller.
    fn error(&self, message: &str, context: &Value, source: &str) {
        if context.is_null() {
            log::error!(target: source, "{}", message);
        } else {
            log::error!(target: source, "{} {}", message, context);
        }
    }
}

/// Default sink: forwards everything to the `log` crate.
#[derive(Clone, Default)]
pub struct LogCrateSink;

impl LogSink for LogCrateSink {}

/// Sink that drops everything.
#[derive(Clone, Default)]
pub struct NoOpSink;

impl LogSink for NoOpSink {
    fn info(&self, _message: &str, _context: &Value, _source: &str) {}
    fn warn(&self, _message: &str, _context: &Value, _source: &str) {}
    fn error(&self, _message: &str, _context: &Value, _source: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recording {
        warnings: Arc<Mutex<Vec<(String, Value, String)>>>,
    }

    impl LogSink for Recording {
        fn warn(&self, message: &str, context: &Value, source: &str) {
            self.warnings.lock().unwrap().push((
                message.to_string(),
                context.clone(),
                source.to_string(),
            ));
        }
    }

    #[test]
    fn test_default_sink_does_not_panic() {
        let sink = LogCrateSink;
        sink.info("started", &Value::Null, "tier_cache::test");
        sink.warn("slow", &json!({"backend": "memory"}), "tier_cache::test");
        sink.error("failed", &json!({"key": "k"}), "tier_cache::test");
    }

    #[test]
    fn test_noop_sink() {
        let sink = NoOpSink;
        sink.warn("ignored", &Value::Null, "x");
    }

    #[test]
    fn test_custom_sink_receives_context() {
        let sink = Recording::default();
        let dyn_sink: Arc<dyn LogSink> = Arc::new(sink.clone());

        dyn_sink.warn(
            "backend failed",
            &json!({"backend": "durable-sync"}),
            "tier_cache::manager",
        );
        dyn_sink.info("not recorded", &Value::Null, "tier_cache::manager");

        let warnings = sink.warnings.lock().unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].1["backend"], "durable-sync");
        assert_eq!(warnings[0].2, "tier_cache::manager");
    }
}
