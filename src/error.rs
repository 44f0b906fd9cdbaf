//! Error types for burrow-poller
//!
//! This module defines the error types used throughout the crate,
//! using `thiserror` for ergonomic error handling.
//!
//! Only [`PollerError::Config`] is allowed to abort startup. Everything that
//! goes wrong while a poll cycle runs is confined to its branch: transport
//! failures become failure records, and [`RecordError`] values are logged and
//! the record is dropped.

use thiserror::Error;

/// Main error type for burrow-poller operations
#[derive(Error, Debug)]
pub enum PollerError {
    /// Configuration-related errors (URL, auth pair, api version, schedule)
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP client construction errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors raised while turning a response into a record.
///
/// This is the closed set of failures the emitter swallows. Anything else
/// is a defect and is not caught.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// The body was not valid JSON, or decoded to something other than objects
    #[error("Decode error: {0}")]
    Decode(String),

    /// The decoration hook or the sink rejected the record
    #[error("Emission error: {0}")]
    Emission(String),
}

/// Result type alias for burrow-poller operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
