//! Error types for the cache manager.

use crate::backend::BackendId;
use std::fmt;
use std::sync::Arc;

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error produced by a caller-supplied fallback.
pub type FallbackSource = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Error types for the cache manager.
///
/// Backend-level variants (`BackendUnavailable`, `Uninitialized`, `BackendIo`,
/// `Timeout`) are tolerated by the manager during multi-backend operations:
/// they are logged and the operation moves on to the next backend. Only when
/// every targeted backend fails does the caller see `AllBackendsFailed`.
#[derive(Debug, Clone)]
pub enum Error {
    /// A value could not be encoded for storage.
    ///
    /// Always aborts `set` before any backend is written.
    SerializationError(String),

    /// Stored bytes could not be decoded back into the requested type.
    ///
    /// **Recovery:** the entry is dropped from the backend and treated as a miss.
    DeserializationError(String),

    /// The envelope header does not carry the expected magic bytes.
    InvalidCacheEntry(String),

    /// Entry was written with a different envelope schema version.
    VersionMismatch {
        /// Expected schema version (from compiled code)
        expected: u32,
        /// Found schema version (from stored entry)
        found: u32,
    },

    /// Backend cannot accept the operation right now.
    ///
    /// Common causes:
    /// - Durable-sync quota exceeded
    /// - Backend disposed
    BackendUnavailable { backend: BackendId, reason: String },

    /// Backend requires explicit initialization and has not been initialized.
    Uninitialized(BackendId),

    /// Transient read/write failure inside a backend.
    BackendIo { backend: BackendId, message: String },

    /// Backend operation exceeded the configured deadline.
    Timeout(String),

    /// The caller-supplied fallback producer failed.
    ///
    /// Never suppressed by the manager. The original error is kept as the
    /// `source()` so callers can downcast it.
    Fallback(FallbackSource),

    /// Every targeted backend failed; one error per backend, in lookup order.
    AllBackendsFailed(Vec<(BackendId, Error)>),

    /// Invalid configuration.
    ConfigError(String),
}

impl Error {
    /// Wrap a fallback failure.
    pub fn fallback<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Fallback(Arc::new(err))
    }

    /// Build a `BackendIo` error tagged with the failing backend.
    pub fn backend_io(backend: BackendId, err: impl fmt::Display) -> Self {
        Error::BackendIo {
            backend,
            message: err.to_string(),
        }
    }

    /// True when the stored bytes are unreadable and should be evicted.
    pub fn is_corrupt_entry(&self) -> bool {
        matches!(
            self,
            Error::DeserializationError(_)
                | Error::InvalidCacheEntry(_)
                | Error::VersionMismatch { .. }
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Error::DeserializationError(msg) => write!(f, "Deserialization error: {}", msg),
            Error::InvalidCacheEntry(msg) => write!(f, "Invalid cache entry: {}", msg),
            Error::VersionMismatch { expected, found } => {
                write!(
                    f,
                    "Cache version mismatch: expected {}, found {}",
                    expected, found
                )
            }
            Error::BackendUnavailable { backend, reason } => {
                write!(f, "Backend {} unavailable: {}", backend, reason)
            }
            Error::Uninitialized(backend) => write!(f, "Backend {} is not initialized", backend),
            Error::BackendIo { backend, message } => {
                write!(f, "Backend {} I/O error: {}", backend, message)
            }
            Error::Timeout(msg) => write!(f, "Timeout: {}", msg),
            Error::Fallback(source) => write!(f, "Fallback failed: {}", source),
            Error::AllBackendsFailed(errors) => {
                write!(f, "All backends failed: ")?;
                for (i, (backend, err)) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{} ({})", backend, err)?;
                }
                Ok(())
            }
            Error::ConfigError(msg) => write!(f, "Config error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Fallback(source) => Some(source.as_ref()),
            _ => None,
        }
    }
}

// ============================================================================
// Conversions from other error types
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        if e.is_syntax() || e.is_eof() || e.is_data() {
            Error::DeserializationError(e.to_string())
        } else {
            Error::SerializationError(e.to_string())
        }
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(e: tokio::time::error::Elapsed) -> Self {
        Error::Timeout(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[derive(Debug)]
    struct ComputeFailed;

    impl fmt::Display for ComputeFailed {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "compute failed")
        }
    }

    impl std::error::Error for ComputeFailed {}

    #[test]
    fn test_error_display() {
        let err = Error::Uninitialized(BackendId::DurableAsync);
        assert_eq!(err.to_string(), "Backend durable-async is not initialized");
    }

    #[test]
    fn test_elapsed_becomes_timeout() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let err: Error = rt
            .block_on(async {
                tokio::time::timeout(
                    std::time::Duration::from_millis(1),
                    std::future::pending::<()>(),
                )
                .await
            })
            .unwrap_err()
            .into();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[test]
    fn test_fallback_keeps_source() {
        let err = Error::fallback(ComputeFailed);
        let source = err.source().expect("fallback should expose its source");
        assert!(source.downcast_ref::<ComputeFailed>().is_some());
        assert_eq!(err.to_string(), "Fallback failed: compute failed");
    }

    #[test]
    fn test_aggregated_display() {
        let err = Error::AllBackendsFailed(vec![
            (BackendId::Memory, Error::Timeout("a".into())),
            (
                BackendId::DurableAsync,
                Error::Uninitialized(BackendId::DurableAsync),
            ),
        ]);
        let text = err.to_string();
        assert!(text.starts_with("All backends failed: memory"));
        assert!(text.contains("durable-async"));
    }
}
