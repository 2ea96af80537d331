//! # Error Taxonomy
//!
//! Every failure in the engine is one of five classes with a fixed recovery
//! policy:
//!
//! | Class | Recovery |
//! |---|---|
//! | `Network` | Abort the current evaluation. |
//! | `Contract` | Mark the interaction invalid; some subtypes also halt the fold. |
//! | `Exception` | Fatal unless `ignore_exceptions` is set. |
//! | `Aborted` | Propagate; in-flight cache writes are dropped. |
//! | `Protocol` | Fatal: malformed data or environment mismatch. |

use thiserror::Error;

/// Finer classification of `Contract`-class failures.
///
/// [`ContractErrorSubtype::KnownError`] merely invalidates the interaction.
/// Every other subtype additionally halts the fold after pending modifiers
/// (such as evolve) have been applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContractErrorSubtype {
    /// Business-level rejection raised by the contract itself.
    KnownError,
    /// Interaction skipped under [`crate::options::UnsafeClientPolicy::Skip`].
    UnsafeClientSkip,
    /// The `__init` constructor rejected the deployment state.
    ConstructorFailed,
    /// The contract is blacklisted and the policy is skip.
    BlacklistedSkip,
    /// The active source is not on the configured allowlist.
    NonWhitelistedSource,
}

impl ContractErrorSubtype {
    /// True when this subtype stops the fold after the evolve modifier runs.
    #[must_use]
    pub fn halts_evaluation(&self) -> bool {
        !matches!(self, Self::KnownError)
    }
}

/// The engine-level error type surfaced by `read_state` and friends.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum EvaluationError {
    /// A loader could not retrieve data. Carries the HTTP status when the
    /// failure was a gateway response.
    #[error("network error{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Network {
        /// Transport or gateway diagnostic.
        message: String,
        /// Gateway HTTP status, when one was received.
        status: Option<u16>,
    },

    /// A contract-level failure attributed to a single interaction.
    #[error("contract error ({subtype:?}): {message}")]
    Contract {
        /// The contract's or the engine's diagnostic.
        message: String,
        /// Recovery classification.
        subtype: ContractErrorSubtype,
    },

    /// Unexpected failure inside a handler.
    #[error("handler exception: {0}")]
    Exception(String),

    /// The evaluation was cancelled through its token.
    #[error("evaluation aborted")]
    Aborted,

    /// Malformed data, unsupported content type, or environment mismatch.
    #[error("protocol violation: {0}")]
    Protocol(String),
}

impl EvaluationError {
    /// Shorthand for a network error without a status.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            status: None,
        }
    }

    /// Shorthand for a known (non-halting) contract error.
    #[must_use]
    pub fn contract(message: impl Into<String>) -> Self {
        Self::Contract {
            message: message.into(),
            subtype: ContractErrorSubtype::KnownError,
        }
    }

    /// True when the error must surface to the caller rather than be
    /// recorded as an invalid interaction.
    #[must_use]
    pub fn is_fatal(&self, ignore_exceptions: bool) -> bool {
        match self {
            Self::Network { .. } | Self::Aborted | Self::Protocol(_) => true,
            Self::Exception(_) => !ignore_exceptions,
            Self::Contract { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_error_display_includes_status() {
        let err = EvaluationError::Network {
            message: "gateway unavailable".into(),
            status: Some(504),
        };
        assert_eq!(err.to_string(), "network error (504): gateway unavailable");
        assert_eq!(
            EvaluationError::network("refused").to_string(),
            "network error: refused"
        );
    }

    #[test]
    fn test_fatality_table() {
        assert!(EvaluationError::network("x").is_fatal(true));
        assert!(EvaluationError::Aborted.is_fatal(true));
        assert!(EvaluationError::Protocol("bad tag".into()).is_fatal(true));
        assert!(!EvaluationError::Exception("boom".into()).is_fatal(true));
        assert!(EvaluationError::Exception("boom".into()).is_fatal(false));
        assert!(!EvaluationError::contract("rejected").is_fatal(false));
    }

    #[test]
    fn test_subtype_halting() {
        assert!(!ContractErrorSubtype::KnownError.halts_evaluation());
        assert!(ContractErrorSubtype::UnsafeClientSkip.halts_evaluation());
        assert!(ContractErrorSubtype::ConstructorFailed.halts_evaluation());
        assert!(ContractErrorSubtype::BlacklistedSkip.halts_evaluation());
        assert!(ContractErrorSubtype::NonWhitelistedSource.halts_evaluation());
    }
}
