//! # Execution Context Modifiers
//!
//! Hooks run after every folded interaction, able to swap the active
//! contract definition for the rest of the fold. The built-in
//! [`EvolveModifier`] implements source evolution: once a folded state
//! carries an accepted `evolve` directive, the definition is reloaded
//! with the new source forced and subsequent interactions use the new
//! handler.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};
use weft_loader::{DefinitionLoader, LoaderError};
use weft_types::{ContractDefinition, EvaluationError, EvaluationOptions, TxId};

/// What a modifier sees after an interaction was applied.
pub struct ModifierContext<'a> {
    /// The contract being folded.
    pub contract: &'a TxId,
    /// The active definition.
    pub definition: &'a ContractDefinition,
    /// State after the interaction.
    pub state: &'a JsonValue,
    /// The evaluation's options.
    pub options: &'a EvaluationOptions,
}

/// A post-interaction hook that may rebind the active definition.
#[async_trait]
pub trait ExecutionContextModifier: Send + Sync {
    /// Returns a replacement definition, or `None` to leave the context
    /// untouched.
    async fn modify(
        &self,
        ctx: ModifierContext<'_>,
        definitions: &dyn DefinitionLoader,
    ) -> Result<Option<ContractDefinition>, EvaluationError>;
}

/// The built-in evolve modifier.
#[derive(Default)]
pub struct EvolveModifier;

/// Reads the evolve directive out of a folded state.
///
/// The directive is honored from `state.evolve` or
/// `state.settings.evolve`, and suppressed when the contract pins
/// `canEvolve: false`.
#[must_use]
pub fn evolve_source(state: &JsonValue) -> Option<TxId> {
    let can_evolve = state
        .get("canEvolve")
        .and_then(JsonValue::as_bool)
        .unwrap_or(true);
    if !can_evolve {
        return None;
    }
    state
        .get("evolve")
        .and_then(JsonValue::as_str)
        .or_else(|| {
            state
                .get("settings")
                .and_then(|settings| settings.get("evolve"))
                .and_then(JsonValue::as_str)
        })
        .filter(|src| !src.is_empty())
        .map(TxId::from)
}

#[async_trait]
impl ExecutionContextModifier for EvolveModifier {
    async fn modify(
        &self,
        ctx: ModifierContext<'_>,
        definitions: &dyn DefinitionLoader,
    ) -> Result<Option<ContractDefinition>, EvaluationError> {
        let Some(src) = evolve_source(ctx.state) else {
            return Ok(None);
        };
        if src == ctx.definition.src_tx_id {
            return Ok(None);
        }

        match definitions.load(ctx.contract, Some(&src)).await {
            Ok(evolved) => {
                debug!(
                    contract = %ctx.contract,
                    from = %ctx.definition.src_tx_id,
                    to = %src,
                    "evolving contract source"
                );
                Ok(Some(evolved))
            }
            // A source that cannot be fetched over the network is a real
            // failure; anything else leaves the old source active.
            Err(err @ (LoaderError::Http { .. } | LoaderError::Transport(_))) => {
                Err(EvaluationError::from(err))
            }
            Err(err) => {
                warn!(
                    contract = %ctx.contract,
                    src = %src,
                    error = %err,
                    "evolve source rejected, retaining current source"
                );
                Ok(None)
            }
        }
    }
}
