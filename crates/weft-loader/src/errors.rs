//! Loader error types.

use thiserror::Error;
use weft_types::EvaluationError;

/// Failure while loading interactions or definitions.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// The gateway answered with a non-2xx status.
    #[error("gateway returned {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body or status text.
        message: String,
    },

    /// The request never produced a response.
    #[error("transport failure: {0}")]
    Transport(String),

    /// A response arrived but could not be decoded.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The loaded data violates the protocol: unsupported content type,
    /// missing required tag, or environment mismatch.
    #[error("protocol violation: {0}")]
    Protocol(String),
}

impl From<reqwest::Error> for LoaderError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::Http {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => Self::Transport(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for LoaderError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

impl From<LoaderError> for EvaluationError {
    fn from(err: LoaderError) -> Self {
        match err {
            LoaderError::Http { status, message } => EvaluationError::Network {
                message,
                status: Some(status),
            },
            LoaderError::Transport(message) => EvaluationError::network(message),
            LoaderError::Malformed(message) | LoaderError::Protocol(message) => {
                EvaluationError::Protocol(message)
            }
        }
    }
}
