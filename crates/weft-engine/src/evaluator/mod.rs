//! # State Evaluation
//!
//! The deterministic fold of a contract's interaction stream. The shared
//! loop lives in [`base`]; [`cacheable`] wraps it with cache probes,
//! partial resumes from the closest earlier snapshot, and
//! confirmation-aware persistence.

pub mod base;
pub mod cacheable;

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use weft_types::{
    ContractDefinition, EvaluationError, EvaluationOptions, Interaction, SortKey, TxId,
};

use crate::domain::call_stack::CallStack;
use crate::domain::interaction_state::InteractionState;
use crate::service::{Engine, StateResult};

pub use base::BaseStateEvaluator;
pub use cacheable::CacheableStateEvaluator;

/// Everything one evaluation needs, bundled. Built by the engine per
/// (possibly nested) `read_state` call and handed to the evaluator.
pub struct EvalContext {
    /// The contract being folded.
    pub contract: TxId,
    /// Its resolved definition.
    pub definition: ContractDefinition,
    /// The contract's interactions, sorted ascending, bounded by
    /// `target_sort_key`.
    pub interactions: Vec<Interaction>,
    /// The sort key the state is requested at.
    pub target_sort_key: SortKey,
    /// Options of the root evaluation; nested calls inherit them.
    pub options: EvaluationOptions,
    /// The cross-contract call chain above this evaluation.
    pub stack: CallStack,
    /// The root call's transactional scratchpad.
    pub state: Arc<InteractionState>,
    /// Cooperative cancellation for the whole root call.
    pub cancel: CancellationToken,
}

/// A state evaluation strategy.
#[async_trait]
pub trait StateEvaluator: Send + Sync {
    /// Evaluates the contract state described by `ctx`, returning the
    /// sort key the result holds at.
    async fn eval(
        &self,
        engine: &Arc<Engine>,
        ctx: EvalContext,
    ) -> Result<(SortKey, StateResult), EvaluationError>;
}
