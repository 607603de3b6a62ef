//! Error types for conversation stores
//!
//! Durable adapters report [`StoreError`]. Cache adapters report the much
//! narrower [`CacheUnavailable`], since every cache failure is handled the same
//! way by callers: bypass the cache and carry on.

use thiserror::Error;

/// Main error type for durable store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Connection error - network or connection pool issues
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Query execution error
    #[error("Query error: {0}")]
    QueryError(String),

    /// Operation timeout
    #[error("Operation timed out after {timeout_ms}ms: {context}")]
    TimeoutError { timeout_ms: u64, context: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Serialization/Deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Filesystem error from the file-backed store
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Neo4rs driver error (wrapper)
    #[error("Neo4rs driver error: {0}")]
    DriverError(#[from] neo4rs::Error),

    /// Generic error with context
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for durable store operations
pub type Result<T> = std::result::Result<T, StoreError>;

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::SerializationError(e.to_string())
    }
}

impl From<String> for StoreError {
    fn from(s: String) -> Self {
        StoreError::Other(s)
    }
}

impl From<&str> for StoreError {
    fn from(s: &str) -> Self {
        StoreError::Other(s.to_string())
    }
}

/// The cache could not be reached or returned something unusable
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Cache unavailable: {0}")]
pub struct CacheUnavailable(pub String);

impl CacheUnavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for CacheUnavailable {
    fn from(e: redis::RedisError) -> Self {
        CacheUnavailable(e.to_string())
    }
}
