//! Error types for Relaybox
//!
//! This module defines the error taxonomy used throughout the crate, using
//! `thiserror` for ergonomic error handling. Each stage of the client has
//! its own enum so callers can react to failures precisely:
//!
//! - [`AuthError`]: terminal for the session
//! - [`FetchError`]: local to one feed, degrades to an empty state
//! - [`SendError`]: recovered locally, input is preserved
//!
//! [`RelayError`] wraps all of them for the application layer.

use thiserror::Error;

/// Authentication handshake failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The host supplied no init credential
    #[error("No init data supplied by the host")]
    MissingCredential,

    /// A single strategy attempt failed at transport level
    #[error("Auth strategy {strategy} failed: {reason}")]
    TransportFailure {
        /// Name of the strategy that failed
        strategy: String,
        /// Human-readable failure reason
        reason: String,
    },

    /// Every configured strategy failed
    #[error("All auth strategies failed after {attempts} attempts; last error: {last}")]
    AllStrategiesFailed {
        /// Total number of strategy attempts made
        attempts: usize,
        /// The last failure observed
        last: Box<AuthError>,
    },

    /// The server answered but refused the credential
    #[error("Authorization rejected: {0}")]
    Rejected(String),
}

/// Feed fetch failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The server answered with a non-success status
    #[error("HTTP status {0}")]
    HttpStatus(u16),

    /// The request never produced a response
    #[error("Network error: {0}")]
    NetworkException(String),

    /// The response body was not a JSON document
    #[error("Malformed response body: {0}")]
    Decode(String),
}

/// Send and reply failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// The text is empty after trimming
    #[error("Message text is empty")]
    ValidationEmpty,

    /// The server answered with `ok: false`
    #[error("{0}")]
    ServerRejected(String),

    /// The request failed before the server could answer
    #[error("Network error: {0}")]
    NetworkException(String),

    /// The session role does not allow the operation
    #[error("Operation requires an admin session")]
    NotPermitted,
}

/// Main error type for Relaybox operations
#[derive(Error, Debug)]
pub enum RelayError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Authentication errors
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Feed fetch errors
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Send errors
    #[error("Send error: {0}")]
    Send(#[from] SendError),

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

/// Result type alias for Relaybox application-level operations
///
/// Uses `anyhow::Error` so configuration and CLI code can attach context
/// while component APIs keep their typed errors.
pub type Result<T> = anyhow::Result<T>;
