//! Error types for the shipper

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, ShipperError>;

/// Error returned by a [`Dispatcher`](crate::dispatch::Dispatcher) when a
/// single delivery fails (network error, non-2xx status, etc).
pub type DispatchError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum ShipperError {
    /// Active or per-call template name is not registered
    #[error("template '{0}' is not registered")]
    TemplateNotFound(String),

    /// IO error with the operation and file it happened on
    #[error("IO error while {operation} '{}': {source}", path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// One journal record is larger than the whole file budget
    #[error("journal record of {size} bytes exceeds the {max} byte file limit")]
    RecordTooLarge { size: u64, max: u64 },

    /// Existing JSON journal is not an array of objects
    #[error("journal file '{}' does not contain a JSON array", path.display())]
    CorruptJournal { path: PathBuf },

    /// Queues need a Tokio runtime to schedule their work
    #[error("no Tokio runtime available: {0}")]
    NoRuntime(String),

    /// Invalid configuration with details
    #[error("invalid configuration for {key}: {message}")]
    InvalidConfiguration { key: String, message: String },

    /// Global tracing subscriber could not be installed
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(String),
}

impl ShipperError {
    /// Create an IO error with context
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ShipperError::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Create an invalid configuration error
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        ShipperError::InvalidConfiguration {
            key: key.into(),
            message: message.into(),
        }
    }
}
