//! Error types for source driver operations.

use thiserror::Error;

/// Result type for source driver operations
pub type SourceResult<T> = Result<T, SourceError>;

/// Error types for source driver operations
///
/// Connection failures and cursor seek failures are recovered inside the
/// driver and only show up in the logs. What reaches the caller is either a
/// construction-time problem (configuration, persist store) or an error a
/// worker reports from its ack/nack callbacks.
#[derive(Error, Debug)]
pub enum SourceError {
    /// Configuration error - detected before the worker thread starts
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Persisted position store error
    ///
    /// Examples: unknown entry handle, undersized record, unreadable snapshot
    #[error("Persist error: {0}")]
    Persist(String),

    /// Error reported by a source worker callback
    #[error("Worker error: {message}")]
    Worker {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    /// Check if this error is a configuration error
    pub fn is_configuration(&self) -> bool {
        matches!(self, SourceError::Configuration(_))
    }

    /// Check if this error comes from the persist store
    pub fn is_persist(&self) -> bool {
        matches!(self, SourceError::Persist(_))
    }

    /// Check if this error was raised by a worker callback
    pub fn is_worker(&self) -> bool {
        matches!(self, SourceError::Worker { .. })
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        SourceError::Configuration(message.into())
    }

    /// Create a persist store error
    pub fn persist(message: impl Into<String>) -> Self {
        SourceError::Persist(message.into())
    }

    /// Create a worker error from a message
    pub fn worker(message: impl Into<String>) -> Self {
        SourceError::Worker {
            message: message.into(),
            source: None,
        }
    }

    /// Create a worker error with source
    pub fn worker_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        SourceError::Worker {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for SourceError {
    fn from(err: toml::de::Error) -> Self {
        SourceError::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let config = SourceError::config("id missing");
        assert!(config.is_configuration());
        assert!(!config.is_persist());

        let persist = SourceError::persist("bad handle");
        assert!(persist.is_persist());

        let worker = SourceError::worker_with_source(
            "ack failed",
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe"),
        );
        assert!(worker.is_worker());
        assert!(std::error::Error::source(&worker).is_some());
    }

    #[test]
    fn test_error_display() {
        let err = SourceError::worker("test error");
        assert_eq!(err.to_string(), "Worker error: test error");

        let err = SourceError::persist("no such entry");
        assert_eq!(err.to_string(), "Persist error: no such entry");
    }
}
