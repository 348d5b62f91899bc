//! Error types for ipd-dl
//!
//! This module provides error handling for the library, including:
//! - Domain-specific error types (Record, Index, Config)
//! - Conversions from the underlying I/O, HTTP and serialization errors
//! - A crate-wide [`Result`] alias

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ipd-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for ipd-dl
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "workers")
        key: Option<String>,
    },

    /// Network error from the HTTP client
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A fetched response body could not be classified or parsed
    #[error("record error: {0}")]
    Record(#[from] RecordError),

    /// Index store operation failed
    #[error("index error: {0}")]
    Index(#[from] IndexError),

    /// URL construction failed
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Errors raised while classifying or parsing a fetched record body
#[derive(Debug, Error)]
pub enum RecordError {
    /// The body carried an ERROR line other than the not-found sentinel
    #[error("unexpected error line in response: {line}")]
    UnexpectedError {
        /// The offending line as received
        line: String,
    },

    /// No identifier line was found in a flat-file body
    #[error("no ID line found in flat-file record")]
    MissingIdLine,

    /// The identifier line carried no identifier token
    #[error("empty identifier in line: {line}")]
    EmptyId {
        /// The identifier line as received
        line: String,
    },

    /// No date line was found in a flat-file body
    #[error("no DT line found in flat-file record")]
    MissingDateLine,

    /// The date token could not be parsed as day/month/year
    #[error("invalid release date: {value}")]
    InvalidDate {
        /// The date token as received
        value: String,
    },

    /// A sequence header line did not contain an identifier
    #[error("malformed sequence header: {line}")]
    MalformedHeader {
        /// The header line as received
        line: String,
    },
}

/// Errors raised by the index store
#[derive(Debug, Error)]
pub enum IndexError {
    /// The advisory lock on the backing file is held by another process
    #[error("index store {path} is locked by another process")]
    LockBusy {
        /// Path of the locked backing file
        path: PathBuf,
    },

    /// The backing file holds data that is not a valid identifier→date mapping
    ///
    /// Upserts refuse to overwrite a corrupt file so previously recorded
    /// entries are never lost.
    #[error("index store {path} is corrupt: {reason}")]
    Corrupt {
        /// Path of the corrupt backing file
        path: PathBuf,
        /// Parse failure description
        reason: String,
    },
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display_includes_message() {
        let err = Error::Config {
            message: "workers must be at least 1".to_string(),
            key: Some("workers".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "configuration error: workers must be at least 1"
        );
    }

    #[test]
    fn record_error_converts_into_error() {
        let err: Error = RecordError::MissingDateLine.into();
        assert!(matches!(err, Error::Record(RecordError::MissingDateLine)));
        assert_eq!(
            err.to_string(),
            "record error: no DT line found in flat-file record"
        );
    }

    #[test]
    fn lock_busy_display_names_the_path() {
        let err = IndexError::LockBusy {
            path: PathBuf::from("/tmp/MHC_date_lookup.json"),
        };
        assert!(err.to_string().contains("MHC_date_lookup.json"));
    }
}
