use thiserror::Error;

/// Errors raised by the cache store and its typed operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache item not found: {0}")]
    NotFound(String),

    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    #[error("Cache codec error: {0}")]
    Codec(String),

    #[error("Cache storage error: {0}")]
    Storage(String),

    #[error("Search {pattern} matched {count} items, expected one")]
    Ambiguous { pattern: String, count: usize },
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Codec(err.to_string())
    }
}
