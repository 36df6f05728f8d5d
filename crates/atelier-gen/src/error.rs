//! Error types for atelier-gen

use thiserror::Error;

/// Generation client error type
#[derive(Debug, Error)]
pub enum Error {
    /// Provider not configured
    #[error("provider not configured: {0}")]
    NotConfigured(String),

    /// API error (sanitized)
    #[error("api error: {0}")]
    Api(String),

    /// Network error
    #[error("network error: {0}")]
    Network(String),

    /// The model's reply could not be parsed into an app description
    #[error("invalid reply: {0}")]
    InvalidReply(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
