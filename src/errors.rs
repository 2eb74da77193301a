use std::time::Duration;
use thiserror::Error;

/// Failure reported by a backend fetch function.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("throttled by backend; retry-after-ms: {retry_after_ms:?}")]
    Throttled { retry_after_ms: Option<u64> },

    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("client error {status}: {message}")]
    Client { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),
}

impl BackendError {
    /// Classifies an HTTP-like status code. 429 maps to `Throttled`, 5xx to `Server`,
    /// everything else to `Client`.
    #[must_use]
    pub fn from_status(status: u16, message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        match status {
            429 => Self::Throttled {
                retry_after_ms: retry_after
                    .map(|d| crate::utils::num::u128_to_u64_saturating(d.as_millis())),
            },
            500..=599 => Self::Server { status, message: message.into() },
            _ => Self::Client { status, message: message.into() },
        }
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::Client { .. })
    }

    #[must_use]
    pub fn retry_after(&self) -> Option<Option<Duration>> {
        match self {
            Self::Throttled { retry_after_ms } => Some(retry_after_ms.map(Duration::from_millis)),
            _ => None,
        }
    }
}

/// Errors surfaced by the cache. `Clone` so that every coalesced waiter receives
/// the same outcome as the leader.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("no cached entry for key: {0}")]
    NotFound(String),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("backend call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("in-flight fetch aborted before completion")]
    FetchAborted,
}

impl CacheError {
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Backend(e) => e.is_retryable(),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for CacheError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
