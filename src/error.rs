//! Centralized error handling for hostprep
//!
//! Probe and command failures are not errors here: they travel as values
//! (`ProbeOutcome`, `CommandResult`). This type covers what ends a run.

use std::io;
use std::path::PathBuf;

/// Custom error type for hostprep operations
#[derive(Debug, thiserror::Error)]
pub enum HostprepError {
    /// I/O errors (file reading, directory setup)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Config file could not be decoded
    #[error("Config error in {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Session snapshot could not be encoded or decoded
    #[error("State error: {0}")]
    State(#[from] serde_json::Error),

    /// The interrupt handler could not be installed
    #[error("Signal error: {0}")]
    Signal(#[from] ctrlc::Error),

    /// The run needs root and does not have it
    #[error("This program must be run with root privileges (try: sudo {0})")]
    Privilege(String),
}

/// Type alias for Results in hostprep
pub type Result<T> = std::result::Result<T, HostprepError>;
