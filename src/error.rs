//! Error types for ringcache
//!
//! The cache engine itself never fails: capacity overflow evicts, a full
//! write queue drops, and an empty ring reads as a miss. These errors cover
//! the edges around it (configuration, the HTTP adapter, process startup).

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur outside the cache hot path
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed or out-of-bounds client request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Prometheus registry error
    #[error("Metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the error was caused by the caller rather than the server
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::InvalidRequest(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Config("shard_capacity must be at least 1".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: shard_capacity must be at least 1"
        );
    }

    #[test]
    fn test_client_error_classification() {
        assert!(Error::InvalidRequest("bad".into()).is_client_error());
        assert!(!Error::Internal("boom".into()).is_client_error());
    }
}
