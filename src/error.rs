//! Centralized error types for the Contour traffic router

use thiserror::Error;

/// Traffic router error types
#[derive(Debug, Error)]
pub enum RouterError {
    /// Required input is missing or malformed
    #[error("illegal parameter(s): {0}")]
    InvalidArgument(String),

    /// A fetched document or payload does not match the expected schema
    #[error("decode error: {0}")]
    Decode(String),

    /// A named backend or a route carrying backends is absent
    #[error("{0} is not found in HTTPProxy")]
    NotFound(String),

    /// Fetching from or writing to the backing store failed
    #[error("store error: {0}")]
    Store(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, RouterError>;
