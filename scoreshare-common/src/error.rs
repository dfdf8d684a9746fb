//! Common error types for ScoreShare

use thiserror::Error;

/// Common result type for ScoreShare operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the service and the client
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML configuration file could not be parsed
    #[error("Invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
