//! Error types for quake-console

use thiserror::Error;

/// Result type for quake-console operations
pub type Result<T> = std::result::Result<T, ConsoleError>;

/// quake-console error types
#[derive(Debug, Error)]
pub enum ConsoleError {
    /// Server process could not be launched
    #[error("Spawn error: {0}")]
    SpawnError(String),

    /// Command could not be transmitted to the server
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Embedded engine rejected or failed an operation
    #[error("Engine error: {0}")]
    EngineError(String),
}
