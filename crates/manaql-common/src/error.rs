//! Error types for ManaQL

use thiserror::Error;

/// Result type alias for ManaQL operations
pub type Result<T> = std::result::Result<T, ManaqlError>;

/// Main error type for ManaQL
#[derive(Error, Debug)]
pub enum ManaqlError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),
}
