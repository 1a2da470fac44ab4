//! Error types for the noggin crate
//!
//! Transport and collaborator failures are expected at runtime; the public
//! control surface reports them as boolean results or spoken fallbacks, and
//! these types only travel inside the crate and across the collaborator
//! traits.

use thiserror::Error;

/// Noggin errors
#[derive(Error, Debug, Clone)]
pub enum NogginError {
    /// Network transport error (connect, read, write)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Service discovery error or timeout
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// Audio output device or stream error
    #[error("Playback error: {0}")]
    Playback(String),

    /// Speech capture error
    #[error("Capture error: {0}")]
    Capture(String),

    /// Query processing error
    #[error("Query error: {0}")]
    Query(String),

    /// Speech synthesis error
    #[error("Synthesis error: {0}")]
    Synthesis(String),

    /// Channel communication error
    #[error("Channel error: {0}")]
    Channel(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system I/O error
    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for NogginError {
    fn from(e: std::io::Error) -> Self {
        NogginError::Io(e.to_string())
    }
}

impl NogginError {
    /// Check if this error is recoverable
    ///
    /// Recoverable errors allow the session loop to keep running; the others
    /// require user intervention (fixing config, plugging in a device).
    pub fn is_recoverable(&self) -> bool {
        match self {
            // The link reconnects on the next send
            NogginError::Transport(_) => true,
            // The device may simply be offline right now
            NogginError::Discovery(_) => true,
            // Output device errors usually need intervention
            NogginError::Playback(_) => false,
            // Capture and query failures end one session, not the process
            NogginError::Capture(_) => true,
            NogginError::Query(_) => true,
            NogginError::Synthesis(_) => true,
            // Channel errors indicate a dead worker
            NogginError::Channel(_) => false,
            NogginError::Config(_) => false,
            NogginError::Io(_) => false,
        }
    }
}

/// Result type alias for noggin operations
pub type Result<T> = std::result::Result<T, NogginError>;
