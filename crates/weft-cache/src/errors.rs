//! Cache error types.

use thiserror::Error;
use weft_types::EvaluationError;

/// Failure inside a sort-key cache adapter.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backing store failed.
    #[error("cache storage: {0}")]
    Storage(String),

    /// A persisted value could not be encoded or decoded.
    #[error("cache codec: {0}")]
    Codec(String),

    /// A persisted key is not in the `!<contract>!<sort_key>` layout.
    #[error("malformed cache key: {0}")]
    MalformedKey(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

impl From<rocksdb::Error> for CacheError {
    fn from(err: rocksdb::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<CacheError> for EvaluationError {
    fn from(err: CacheError) -> Self {
        EvaluationError::Protocol(format!("state cache failure: {err}"))
    }
}
