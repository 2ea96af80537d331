//! # Evaluation Results
//!
//! The types that cross the host/guest boundary: the folded state with its
//! per-interaction verdicts, the tagged handler result, and the call record
//! a handler receives.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// An opaque transaction identifier.
///
/// Contract ids, source ids and interaction ids are all transaction ids on
/// the underlying network; the engine never inspects their structure.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(String);

impl TxId {
    /// The wrapped id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TxId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl From<String> for TxId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxId({})", self.0)
    }
}

/// An event emitted by a handler during a successful `handle` call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerEvent {
    /// Event name chosen by the contract.
    pub name: String,
    /// Arbitrary event payload.
    pub data: JsonValue,
    /// The interaction that produced the event.
    pub interaction_id: TxId,
}

/// The folded state of a contract at a sort key, with the validity verdict
/// and error message for every interaction applied on the way there.
///
/// Both maps key on interaction id and preserve insertion order, which is
/// the fold order; serialization is therefore deterministic given a
/// deterministic fold.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvalStateResult<S> {
    /// The folded state.
    pub state: S,
    /// Interaction id → whether the handler accepted it.
    pub validity: IndexMap<TxId, bool>,
    /// Interaction id → handler error message, for rejected interactions.
    pub error_messages: IndexMap<TxId, String>,
    /// Events emitted by accepted interactions, in fold order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<HandlerEvent>,
}

impl<S> EvalStateResult<S> {
    /// A result carrying `state` with empty verdict maps.
    #[must_use]
    pub fn new(state: S) -> Self {
        Self {
            state,
            validity: IndexMap::new(),
            error_messages: IndexMap::new(),
            events: Vec::new(),
        }
    }

    /// Records a verdict, and the error message when invalid.
    pub fn record(&mut self, id: TxId, valid: bool, error_message: Option<String>) {
        self.validity.insert(id.clone(), valid);
        if let Some(message) = error_message {
            self.error_messages.insert(id, message);
        }
    }
}

/// How a call entered the handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionType {
    /// State-mutating interaction.
    Write,
    /// Read-only view; state changes are discarded.
    View,
}

/// The call record a handler receives for one interaction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContractCall {
    /// Parsed `Input` tag payload.
    pub input: JsonValue,
    /// The calling wallet, or the calling contract for internal writes.
    pub caller: String,
    /// Write or view semantics.
    pub interaction_type: InteractionType,
}

/// The tagged outcome of a single `handle` call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InteractionResult<S> {
    /// The handler accepted the interaction.
    Ok {
        /// State after the interaction.
        state: S,
        /// View result, `null` for writes.
        result: JsonValue,
        /// Gas metered by the sandbox, when it meters.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        gas_used: Option<u64>,
        /// Event emitted alongside the result.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        event: Option<HandlerEvent>,
    },
    /// Business-level rejection raised by the contract itself.
    Error {
        /// The contract's message.
        error_message: String,
    },
    /// Unexpected failure inside the handler.
    Exception {
        /// Diagnostic message.
        error_message: String,
    },
}

impl<S> InteractionResult<S> {
    /// True for [`InteractionResult::Ok`].
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    /// The error message for non-ok outcomes.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Ok { .. } => None,
            Self::Error { error_message } | Self::Exception { error_message } => {
                Some(error_message)
            }
        }
    }
}
