//! The fold itself, plus the cache-less evaluator variant.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use weft_types::{
    ContractErrorSubtype, EvalStateResult, EvaluationError, Interaction, InteractionResult,
    SortKey, TxId,
};

use crate::domain::classify::{classify, Disposition};
use crate::domain::call_stack::CallFrame;
use crate::domain::modifiers::ModifierContext;
use crate::events::EngineEvent;
use crate::evaluator::{EvalContext, StateEvaluator};
use crate::ports::outbound::HandleContext;
use crate::service::{Engine, StateResult};

/// Synthetic interaction id under which the constructor's verdict is
/// recorded.
pub const CONSTRUCTOR_ID: &str = "__init";

/// What one fold produced.
pub(crate) struct FoldOutcome {
    /// Sort key the result holds at.
    pub sort_key: SortKey,
    /// The folded state with verdicts.
    pub result: StateResult,
    /// The last applied interaction that passed the cacheability gate,
    /// with the state snapshot taken right after it.
    pub last_confirmed: Option<(Interaction, StateResult)>,
    /// True when the fold started from the initial state rather than a
    /// cached snapshot.
    pub from_init: bool,
    /// Interactions applied.
    pub folded: usize,
}

fn sort_key_of(interaction: &Interaction) -> SortKey {
    match &interaction.sort_key {
        Some(key) => key.clone(),
        None => SortKey::derive(&interaction.block, &interaction.id),
    }
}

/// Folds `ctx.interactions` past `base` up to the target sort key.
///
/// This is the whole algorithm: cycle excision, the constructor,
/// verification hooks, classification, internal writes, the cacheability
/// gate, periodic commits and the modifier (evolve) pass. `persist`
/// decides whether the periodic and end-of-root commits reach the
/// persistent cache; the cache-less variant folds with it off.
#[instrument(skip_all, fields(contract = %ctx.contract, target = %ctx.target_sort_key))]
pub(crate) async fn fold(
    engine: &Arc<Engine>,
    ctx: &EvalContext,
    base: Option<(SortKey, StateResult)>,
    persist: bool,
) -> Result<FoldOutcome, EvaluationError> {
    let contract = &ctx.contract;
    let from_init = base.is_none();
    let (base_sort_key, mut current) = match base {
        Some((key, result)) => (Some(key), result),
        None => (
            None,
            EvalStateResult::new(ctx.definition.init_state.clone()),
        ),
    };

    let missing: Vec<Interaction> = ctx
        .interactions
        .iter()
        .filter(|i| {
            let key = i.sort_key.as_ref();
            base_sort_key.as_ref().map_or(true, |b| key > Some(b))
                && key <= Some(&ctx.target_sort_key)
        })
        .cloned()
        .collect();
    let missing = ctx.stack.excise_cycles(contract, missing);
    let total = missing.len();

    engine.emit(EngineEvent::EvaluationStarted {
        contract: contract.clone(),
        missing: total,
    });

    let mut definition = ctx.definition.clone();
    let mut handler = engine.executor().create(&definition, &ctx.options).await?;

    // Constructor: exactly once, before any other interaction, with the
    // deployment owner as caller.
    let wants_constructor = ctx.options.use_constructor
        || definition
            .manifest
            .as_ref()
            .map_or(false, |m| m.use_constructor);
    if from_init && wants_constructor {
        let constructor = engine.constructor_interaction(&definition);
        let host = engine.host(
            contract.clone(),
            constructor.clone(),
            SortKey::genesis(),
            ctx,
        );
        let hctx = HandleContext {
            interaction: constructor.clone(),
            host,
        };
        match handler
            .maybe_call_state_constructor(current.state.clone(), hctx)
            .await
        {
            Ok(state) => {
                current.state = state;
                current.record(TxId::from(CONSTRUCTOR_ID), true, None);
            }
            Err(err) => {
                ctx.state.rollback(&constructor);
                return Err(EvaluationError::Contract {
                    message: format!("constructor failed: {err}"),
                    subtype: ContractErrorSubtype::ConstructorFailed,
                });
            }
        }
    }

    ctx.state.set_initial(
        contract,
        current.clone(),
        base_sort_key.clone().unwrap_or_else(SortKey::genesis),
    );

    if missing.is_empty() {
        let sort_key = base_sort_key.unwrap_or_else(SortKey::genesis);
        return Ok(FoldOutcome {
            sort_key,
            result: current,
            last_confirmed: None,
            from_init,
            folded: 0,
        });
    }

    let timeout_secs = ctx.options.max_interaction_evaluation_time_seconds;
    let cadence = ctx.options.cache_every_n_interactions;
    let mut last_confirmed: Option<(Interaction, StateResult)> = None;
    let mut last_interaction: Option<Interaction> = None;
    let mut halted = false;

    for (index, interaction) in missing.iter().enumerate() {
        if ctx.cancel.is_cancelled() {
            return Err(EvaluationError::Aborted);
        }
        let sort_key = sort_key_of(interaction);
        let id = interaction.id.clone();

        if interaction.vrf.is_some() {
            if let Some(verifier) = engine.vrf_verifier() {
                if !verifier.verify(interaction) {
                    return Err(EvaluationError::Protocol(format!(
                        "vrf proof verification failed for interaction {id}"
                    )));
                }
            }
        }

        if interaction.signature.is_some() {
            if let Some(verifier) = engine.signature_verifier() {
                if !verifier.verify(interaction) {
                    current.record(
                        id.clone(),
                        false,
                        Some(format!("signature verification failed for {id}")),
                    );
                    continue;
                }
            }
        }

        match classify(contract, interaction, ctx.options.internal_writes) {
            Disposition::Noise => continue,
            Disposition::Invalid(message) => {
                current.record(id.clone(), false, Some(message));
            }
            Disposition::Direct(call) => {
                handler.init_state(&current.state).await;
                let host = engine.host(contract.clone(), interaction.clone(), sort_key.clone(), ctx);
                let hctx = HandleContext {
                    interaction: interaction.clone(),
                    host,
                };

                let handled = if timeout_secs == 0 {
                    handler.handle(hctx, current.clone(), call).await
                } else {
                    match tokio::time::timeout(
                        Duration::from_secs(timeout_secs),
                        handler.handle(hctx, current.clone(), call),
                    )
                    .await
                    {
                        Ok(inner) => inner,
                        Err(_) => Ok(InteractionResult::Exception {
                            error_message: format!(
                                "interaction {id} exceeded the {timeout_secs}s evaluation budget"
                            ),
                        }),
                    }
                };

                let result = match handled {
                    Ok(result) => Some(result),
                    // A nested host call surfaced a contract-level
                    // rejection; the interaction is invalid, the fold
                    // goes on. Halting subtypes stop it after the
                    // modifier pass below. Anything else is fatal.
                    Err(EvaluationError::Contract { message, subtype })
                        if !subtype.halts_evaluation() =>
                    {
                        Some(InteractionResult::Error {
                            error_message: message,
                        })
                    }
                    Err(EvaluationError::Contract { message, .. }) => {
                        current.record(id.clone(), false, Some(message));
                        halted = true;
                        None
                    }
                    Err(fatal) => return Err(fatal),
                };

                if let Some(result) = result {
                    match result {
                        InteractionResult::Ok { state, event, .. } => {
                            current.state = state;
                            current.record(id.clone(), true, None);
                            if let Some(event) = event {
                                current.events.push(event);
                            }
                        }
                        InteractionResult::Error { error_message } => {
                            current.record(id.clone(), false, Some(error_message));
                        }
                        InteractionResult::Exception { error_message } => {
                            if ctx.options.ignore_exceptions {
                                warn!(
                                    interaction = %id,
                                    error = %error_message,
                                    "handler exception ignored"
                                );
                                current.record(id.clone(), false, Some(error_message));
                            } else {
                                ctx.state.rollback(interaction);
                                return Err(EvaluationError::Exception(error_message));
                            }
                        }
                    }
                }
            }
            Disposition::InternalWrite { writer } => {
                let nested_stack = ctx.stack.push(CallFrame {
                    contract: contract.clone(),
                    interaction_id: id.clone(),
                    sort_key: sort_key.clone(),
                });
                let (_, writer_result) = engine
                    .read_state_internal(
                        writer.clone(),
                        Some(sort_key.clone()),
                        ctx.options.clone(),
                        nested_stack,
                        Arc::clone(&ctx.state),
                        ctx.cancel.clone(),
                    )
                    .await?;

                let accepted = writer_result.validity.get(&id).copied().unwrap_or(false);
                if accepted {
                    if let Some(staged) = ctx.state.get(contract, &sort_key) {
                        current.state = staged.state;
                    }
                    current.record(id.clone(), true, None);
                } else {
                    let message = writer_result
                        .error_messages
                        .get(&id)
                        .cloned()
                        .unwrap_or_else(|| {
                            format!("internal write {id} rejected by writer {writer}")
                        });
                    current.record(id.clone(), false, Some(message));
                }
            }
        }

        ctx.state.update(
            contract,
            current.clone(),
            sort_key.clone(),
            interaction.is_cacheable(),
        );
        last_interaction = Some(interaction.clone());

        if interaction.is_cacheable() {
            last_confirmed = Some((interaction.clone(), current.clone()));
        }

        engine.emit(EngineEvent::InteractionCompleted {
            contract: contract.clone(),
            interaction: id.clone(),
            valid: current.validity.get(&id).copied().unwrap_or(false),
        });
        let frequency = engine.progress_frequency();
        if frequency > 0 && (index + 1) % frequency == 0 {
            engine.emit(EngineEvent::ProgressNotification {
                contract: contract.clone(),
                current: index + 1,
                all: total,
            });
        }

        if persist {
            let flush_each = ctx.options.update_cache_for_each_interaction;
            let flush_cadence = cadence > 0 && ((index + 1) as i64) % cadence == 0;
            if flush_each || flush_cadence {
                engine.commit_scratch(&ctx.state, interaction, false)?;
            }
        }

        // Pending modifiers (evolve) run even when this interaction
        // halted the fold.
        for modifier in engine.modifiers() {
            let mctx = ModifierContext {
                contract,
                definition: &definition,
                state: &current.state,
                options: &ctx.options,
            };
            let evolved = modifier.modify(mctx, engine.definitions()).await?;
            if let Some(new_definition) = evolved {
                match engine.executor().create(&new_definition, &ctx.options).await {
                    Ok(new_handler) => {
                        definition = new_definition;
                        handler = new_handler;
                    }
                    Err(EvaluationError::Contract { message, subtype })
                        if subtype.halts_evaluation() =>
                    {
                        current.record(id.clone(), false, Some(message));
                        halted = true;
                    }
                    Err(fatal) => return Err(fatal),
                }
            }
        }

        if halted {
            debug!(interaction = %id, "fold halted");
            break;
        }
    }

    if ctx.stack.is_root() {
        if let Some(last) = &last_interaction {
            let last_valid = current.validity.get(&last.id).copied().unwrap_or(true);
            if last_valid {
                if persist {
                    engine.commit_scratch(&ctx.state, last, false)?;
                }
            } else {
                ctx.state.rollback(last);
            }
        }
    }

    engine.emit(EngineEvent::EvaluationCompleted {
        contract: contract.clone(),
        sort_key: ctx.target_sort_key.clone(),
    });

    Ok(FoldOutcome {
        sort_key: ctx.target_sort_key.clone(),
        result: current,
        last_confirmed,
        from_init,
        folded: total,
    })
}

/// The cache-less evaluator: every call folds the full history from the
/// initial state. Deterministic baseline for tests and for hosts that
/// bring no persistence.
#[derive(Default)]
pub struct BaseStateEvaluator;

impl BaseStateEvaluator {
    /// A new base evaluator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StateEvaluator for BaseStateEvaluator {
    async fn eval(
        &self,
        engine: &Arc<Engine>,
        ctx: EvalContext,
    ) -> Result<(SortKey, StateResult), EvaluationError> {
        // Staged state from an enclosing call still takes precedence;
        // without it a nested write-back read would re-derive stale state.
        if let Some(staged) = ctx.state.get(&ctx.contract, &ctx.target_sort_key) {
            return Ok((ctx.target_sort_key.clone(), staged));
        }
        let outcome = fold(engine, &ctx, None, false).await?;
        engine.record_fold(outcome.folded);
        Ok((outcome.sort_key, outcome.result))
    }
}
