//! Error types for atelier-coord

use thiserror::Error;

/// Coordination layer error type
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Component not found in the registry
    #[error("component not found: {0}")]
    ComponentNotFound(String),

    /// Asynchronous component resolution failed
    #[error("resolution of component '{name}' failed: {reason}")]
    ResolutionFailed {
        /// Component name the resolution was for
        name: String,
        /// Why the loader (or the registry) could not produce a factory
        reason: String,
    },

    /// Broadcast transport is gone; the message was not forwarded
    #[error("broadcast transport closed")]
    TransportClosed,
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
