//! Common error types for AllerScan

use thiserror::Error;

/// Common result type for AllerScan operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across AllerScan crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Vocabulary loading or validation error
    #[error("Vocabulary error: {0}")]
    Vocabulary(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
