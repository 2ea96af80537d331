//! Cache-assisted evaluation.
//!
//! Wraps the fold with three cache interactions: an exact probe short-
//! circuiting the whole evaluation, a `≤` probe picking the closest
//! earlier snapshot as the fold's base, and confirmation-aware
//! persistence of the last confirmed snapshot once the fold is done.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;
use weft_cache::SortKeyCache;
use weft_types::{EvaluationError, SortKey};

use crate::evaluator::base::fold;
use crate::evaluator::{EvalContext, StateEvaluator};
use crate::service::{Engine, StateResult};

/// The production evaluator: resumes from cache, persists what is
/// confirmed.
pub struct CacheableStateEvaluator {
    cache: Arc<dyn SortKeyCache<StateResult>>,
}

impl CacheableStateEvaluator {
    /// An evaluator over `cache`.
    #[must_use]
    pub fn new(cache: Arc<dyn SortKeyCache<StateResult>>) -> Self {
        Self { cache }
    }

    /// The closest usable base at or below `target`: the greater of the
    /// scratchpad's staged view and the persistent cache. The scratchpad
    /// wins ties — it is this root call's newer truth.
    fn resolve_base(
        &self,
        ctx: &EvalContext,
        target: &SortKey,
    ) -> Result<Option<(SortKey, StateResult)>, EvaluationError> {
        let staged = ctx.state.get_less_or_equal(&ctx.contract, target);
        let cached = self
            .cache
            .get_less_or_equal(&ctx.contract, target)?
            .map(|entry| (entry.sort_key, entry.value));

        Ok(match (staged, cached) {
            (Some(staged), Some(cached)) => {
                if cached.0 > staged.0 {
                    Some(cached)
                } else {
                    Some(staged)
                }
            }
            (staged, cached) => staged.or(cached),
        })
    }
}

#[async_trait]
impl StateEvaluator for CacheableStateEvaluator {
    async fn eval(
        &self,
        engine: &Arc<Engine>,
        ctx: EvalContext,
    ) -> Result<(SortKey, StateResult), EvaluationError> {
        let target = ctx.target_sort_key.clone();

        // Staged exact match: a parent fold already produced this state
        // within the current root call.
        if let Some(staged) = ctx.state.get(&ctx.contract, &target) {
            return Ok((target, staged));
        }

        // Exact cache probe.
        if let Some(entry) = self.cache.get(&ctx.contract, &target)? {
            debug!(contract = %ctx.contract, sort_key = %target, "exact cache hit");
            engine.record_cache_hit();
            return Ok((entry.sort_key, entry.value));
        }

        let base = self.resolve_base(&ctx, &target)?;
        let resumed = base.is_some();

        let outcome = fold(engine, &ctx, base, true).await?;
        engine.record_fold(outcome.folded);

        if outcome.folded == 0 && outcome.from_init {
            // Nothing to fold and nothing cached: the initial state is
            // the state at genesis; persist it so the next call is a hit.
            self.cache
                .put(&ctx.contract, SortKey::genesis(), outcome.result.clone())?;
            return Ok((SortKey::genesis(), outcome.result));
        }

        if ctx.stack.is_root() {
            if let Some((interaction, snapshot)) = &outcome.last_confirmed {
                if let Some(key) = &interaction.sort_key {
                    self.cache.put(&ctx.contract, key.clone(), snapshot.clone())?;
                }
            }
        }

        debug!(
            contract = %ctx.contract,
            folded = outcome.folded,
            resumed,
            "evaluation finished"
        );
        Ok((outcome.sort_key, outcome.result))
    }
}
