//! # Driven Ports
//!
//! Everything the evaluation core depends on but does not implement: the
//! handler sandbox boundary, the sandbox plugin registry, the interaction
//! transport, and the optional verifier capabilities. Absence of an
//! optional capability is silently tolerated except where an incoming
//! interaction demands verification.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use weft_types::{
    ContractCall, ContractDefinition, EvaluationError, EvaluationOptions, Interaction,
    InteractionResult, SortKey, Tag, TxId,
};

use crate::service::StateResult;

// =============================================================================
// HOST BRIDGE (engine → guest capabilities)
// =============================================================================

/// Host capabilities exposed to a guest for the duration of one `handle`
/// call.
///
/// Every method is re-entrant into the evaluator on the same logical
/// task. Implementations carry the active interaction, the call stack and
/// the scratchpad, so staged inter-contract effects are visible to nested
/// calls and are committed or rolled back with the root evaluation.
#[async_trait]
pub trait HostBridge: Send + Sync {
    /// State of another contract folded up to `sort_key`, defaulting to
    /// the active interaction's sort key.
    async fn read_contract_state(
        &self,
        contract: &TxId,
        sort_key: Option<&SortKey>,
    ) -> Result<JsonValue, EvaluationError>;

    /// Runs a read-only input against another contract's current state.
    async fn view_contract_state(
        &self,
        contract: &TxId,
        input: JsonValue,
    ) -> Result<InteractionResult<JsonValue>, EvaluationError>;

    /// Applies `input` to another contract and stages the resulting state
    /// in the interaction scratchpad. The staged update becomes the target
    /// contract's state at the active sort key once the surrounding fold
    /// accepts the active interaction.
    async fn write(&self, contract: &TxId, input: JsonValue) -> Result<(), EvaluationError>;

    /// Re-reads the calling contract's own state, including updates staged
    /// by earlier host calls of the same interaction.
    async fn refresh_state(&self) -> Result<JsonValue, EvaluationError>;

    /// Reads a key from the contract's sort-key scoped KV store.
    async fn kv_get(&self, key: &str) -> Result<Option<JsonValue>, EvaluationError>;

    /// Stages a KV write, transactional with the scratchpad.
    async fn kv_put(&self, key: &str, value: JsonValue) -> Result<(), EvaluationError>;

    /// Stages a KV deletion.
    async fn kv_del(&self, key: &str) -> Result<(), EvaluationError>;

    /// Keys visible to the contract at the active sort key.
    async fn kv_keys(&self) -> Result<Vec<String>, EvaluationError>;
}

/// Everything a handler receives besides the call itself.
#[derive(Clone)]
pub struct HandleContext {
    /// The interaction being folded.
    pub interaction: Interaction,
    /// Host capabilities scoped to this `handle` call.
    pub host: Arc<dyn HostBridge>,
}

// =============================================================================
// HANDLER SANDBOX BOUNDARY
// =============================================================================

/// The sandbox boundary.
///
/// Plugins (a vm sandbox, an isolate, QuickJS, WASM ABI glue) implement
/// this trait; the engine depends on nothing else about them. Handlers
/// may be shared across contracts with identical source, so internal VM
/// state must be fully reseeded by [`HandlerApi::init_state`].
#[async_trait]
pub trait HandlerApi: Send + Sync {
    /// Reseeds the handler's internal state between interactions.
    async fn init_state(&self, state: &JsonValue);

    /// Folds one interaction. `current` is the state and verdict maps
    /// accumulated so far.
    ///
    /// `Err` is reserved for infrastructural failures surfaced by nested
    /// host calls; guest-level failures come back as
    /// [`InteractionResult::Error`] or [`InteractionResult::Exception`].
    async fn handle(
        &self,
        ctx: HandleContext,
        current: StateResult,
        call: ContractCall,
    ) -> Result<InteractionResult<JsonValue>, EvaluationError>;

    /// Runs the contract's `__init` constructor against the deployment
    /// state, when the manifest enables one. Called exactly once, before
    /// any other interaction, with the deployment owner as caller.
    async fn maybe_call_state_constructor(
        &self,
        initial_state: JsonValue,
        ctx: HandleContext,
    ) -> Result<JsonValue, EvaluationError>;
}

/// Instantiates handlers for one contract type.
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    /// Compiles `definition` into a handler.
    async fn instantiate(
        &self,
        definition: &ContractDefinition,
        options: &EvaluationOptions,
    ) -> Result<Arc<dyn HandlerApi>, EvaluationError>;
}

// =============================================================================
// TRANSPORT
// =============================================================================

/// Signs and submits interactions. Deployment and wallet management live
/// behind this boundary, outside the engine.
#[async_trait]
pub trait InteractionTransport: Send + Sync {
    /// Submits an interaction carrying `tags` and returns its id.
    async fn submit(&self, contract: &TxId, tags: Vec<Tag>) -> Result<TxId, EvaluationError>;
}

// =============================================================================
// OPTIONAL VERIFIER CAPABILITIES
// =============================================================================

/// Verifies VRF proofs attached to interactions. When attached, an
/// interaction carrying VRF data must verify or the evaluation fails.
pub trait VrfVerifier: Send + Sync {
    /// True when the proof is valid for the interaction.
    fn verify(&self, interaction: &Interaction) -> bool;
}

/// Verifies foreign-chain signatures on interactions. A failed
/// verification marks the interaction invalid; the fold continues.
pub trait SignatureVerifier: Send + Sync {
    /// True when the signature is valid.
    fn verify(&self, interaction: &Interaction) -> bool;
}

/// Contract blacklist consulted before handler instantiation.
#[async_trait]
pub trait ContractBlacklist: Send + Sync {
    /// True when the contract must not be evaluated.
    async fn is_blacklisted(&self, contract: &TxId) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DenyList(Vec<TxId>);

    #[async_trait]
    impl ContractBlacklist for DenyList {
        async fn is_blacklisted(&self, contract: &TxId) -> bool {
            self.0.contains(contract)
        }
    }

    #[tokio::test]
    async fn test_blacklist_port() {
        let list = DenyList(vec![TxId::from("bad")]);
        assert!(list.is_blacklisted(&TxId::from("bad")).await);
        assert!(!list.is_blacklisted(&TxId::from("good")).await);
    }
}
