//! Error types for seqgate

use thiserror::Error;

/// Result type alias for seqgate operations
pub type Result<T> = std::result::Result<T, SeqgateError>;

/// Main error type for seqgate
#[derive(Error, Debug)]
pub enum SeqgateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid bundle filename: {0}")]
    InvalidFilename(String),

    #[error("Corrupt sequence state file '{path}': {detail}")]
    StateParse { path: String, detail: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Reference data error: {0}")]
    Reference(String),

    #[error("Archive error: {0}")]
    Archive(String),
}
