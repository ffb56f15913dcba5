//! Error handling - One hierarchy for every venue, feed and model failure

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Runtime error hierarchy.
///
/// Nothing in the core retries. Every variant is terminal for the attempt
/// that produced it and is only surfaced through logs or an order response.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration or credential errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller passed a value outside the accepted domain (bad side / order type)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Network failure while talking to the venue
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Venue answered with a non-success status
    #[error("Venue rejected request (status {status}): {reason}")]
    VenueRejection { status: u16, reason: String },

    /// WebSocket errors
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Regime model could not be loaded or evaluated
    #[error("Model error: {0}")]
    Model(String),

    /// Filesystem errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Coarse classification used in log lines and order responses.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::Transport(_) | Error::WebSocket(_) | Error::Io(_) => ErrorKind::Transport,
            Error::VenueRejection { .. } => ErrorKind::VenueRejection,
            Error::Config(_) | Error::Serialization(_) | Error::Model(_) => ErrorKind::Internal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Transport,
    VenueRejection,
    Internal,
}
