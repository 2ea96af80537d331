//! # Driving Port
//!
//! The user-facing contract operations. [`crate::service::Contract`] is
//! the production implementation; the trait exists so callers can be
//! written against the boundary and tested with stand-ins.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio_util::sync::CancellationToken;
use weft_types::{EvaluationError, InteractionResult, SortKey, TxId};

use crate::domain::call_stack::CallStack;
use crate::service::StateResult;

/// Per-call-site view of one contract.
#[async_trait]
pub trait ContractApi: Send + Sync {
    /// Evaluates and returns the contract state at `sort_key`, or at the
    /// current tip of the interaction stream when `None`.
    async fn read_state(
        &self,
        sort_key: Option<SortKey>,
        caller_stack: Option<CallStack>,
        signal: Option<CancellationToken>,
    ) -> Result<(SortKey, StateResult), EvaluationError>;

    /// Runs `input` against the current state as a synthetic read-only
    /// interaction. Business-level failures are reported in the returned
    /// [`InteractionResult`], never as an `Err`.
    async fn view_state(
        &self,
        input: JsonValue,
    ) -> Result<InteractionResult<JsonValue>, EvaluationError>;

    /// As [`ContractApi::view_state`] but with write semantics preserved,
    /// for what-if checks. Nothing is persisted.
    async fn dry_write(
        &self,
        input: JsonValue,
        overridden_caller: Option<String>,
    ) -> Result<InteractionResult<JsonValue>, EvaluationError>;

    /// Signs and submits an interaction through the configured transport.
    /// Returns the new interaction's id.
    async fn write_interaction(&self, input: JsonValue) -> Result<TxId, EvaluationError>;

    /// The state at the current tip, without verdict maps.
    async fn current_state(&self) -> Result<JsonValue, EvaluationError>;

    /// Convenience for token-style contracts: the balance of `target`
    /// under the conventional `balances` map.
    async fn current_balance(&self, target: &str) -> Result<u64, EvaluationError>;
}
