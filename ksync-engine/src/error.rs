//! Error types for ksync-engine
//!
//! Defines module-specific error types using thiserror for clear error
//! propagation. The engine's public operations convert these to log entries
//! and terminal states; internal helpers propagate them with `?`.

use thiserror::Error;

/// Main error type for the synchronization engine
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors (bad key name, bad paths)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Lyric loading or cleanup errors
    #[error("Lyrics error: {0}")]
    Lyrics(String),

    /// Operation not valid in the current session phase
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Subtitle export errors
    #[error("Export error: {0}")]
    Export(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using the engine Error
pub type Result<T> = std::result::Result<T, Error>;
