//! # Engine and Contract Facade
//!
//! [`Engine`] wires the ports together — loaders, cache, executor,
//! verifiers, modifiers, evaluator — and owns the re-entrant
//! `read_state` entry point every nested cross-contract call goes
//! through. [`Contract`] is the per-call-site view users hold.

use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::Value as JsonValue;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use weft_cache::SortKeyCache;
use weft_loader::{DefinitionLoader, InteractionLoader};
use weft_types::{
    sort_interactions, tags, BlockRef, ContractCall, ContractDefinition, EvalStateResult,
    EvaluationError, EvaluationOptions, Interaction, InteractionResult, InteractionType, SortKey,
    Tag, TxId,
};

use crate::domain::call_stack::{CallFrame, CallStack};
use crate::domain::interaction_state::{kv_namespace, InteractionState};
use crate::domain::modifiers::{EvolveModifier, ExecutionContextModifier};
use crate::events::{EngineEvent, EventListener};
use crate::evaluator::cacheable::CacheableStateEvaluator;
use crate::evaluator::{EvalContext, StateEvaluator};
use crate::executor::{CachingExecutorFactory, ExecutorFactory};
use crate::ports::inbound::ContractApi;
use crate::ports::outbound::{
    HandleContext, HostBridge, InteractionTransport, SignatureVerifier, VrfVerifier,
};
use async_trait::async_trait;

/// The engine's state payload: folds operate on canonical JSON so states
/// can cross contract (and implementation) boundaries.
pub type StateResult = EvalStateResult<JsonValue>;

/// Engine-level configuration.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Default evaluation options handed to new [`Contract`] facades.
    pub options: EvaluationOptions,
    /// Emit a progress event every N folded interactions; 0 disables.
    pub progress_notification_frequency: usize,
    /// Compiled handlers kept live in the executor cache.
    pub executor_cache_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            options: EvaluationOptions::default(),
            progress_notification_frequency: 0,
            executor_cache_capacity: 100,
        }
    }
}

/// Counters exposed for diagnostics and tests.
#[derive(Clone, Debug, Default)]
pub struct EngineStats {
    /// Evaluations run (including nested ones).
    pub evaluations: u64,
    /// Interactions folded.
    pub interactions_applied: u64,
    /// Exact-match cache hits.
    pub cache_hits: u64,
}

/// The ports an engine is assembled from.
pub struct EngineDeps {
    /// Interaction loader (usually the caching wrapper over a gateway or
    /// GQL loader).
    pub interactions: Arc<dyn InteractionLoader>,
    /// Definition loader.
    pub definitions: Arc<dyn DefinitionLoader>,
    /// The sort-key state cache.
    pub cache: Arc<dyn SortKeyCache<StateResult>>,
    /// Versioned KV store exposed to guests, when enabled.
    pub kv_cache: Option<Arc<dyn SortKeyCache<JsonValue>>>,
    /// Sandbox providers and policy gates.
    pub executor: ExecutorFactory,
    /// Transport for `write_interaction`; optional for read-only hosts.
    pub transport: Option<Arc<dyn InteractionTransport>>,
    /// VRF verification, when attached.
    pub vrf_verifier: Option<Arc<dyn VrfVerifier>>,
    /// Foreign-signature verification, when attached.
    pub signature_verifier: Option<Arc<dyn SignatureVerifier>>,
    /// Post-interaction modifiers; defaults to the evolve modifier.
    pub modifiers: Vec<Arc<dyn ExecutionContextModifier>>,
    /// Evaluation strategy; defaults to the cacheable evaluator over
    /// `cache`.
    pub evaluator: Option<Arc<dyn StateEvaluator>>,
    /// Progress listener.
    pub listener: Option<Arc<dyn EventListener>>,
}

impl EngineDeps {
    /// Deps with the required ports set and everything optional at its
    /// default.
    pub fn new(
        interactions: Arc<dyn InteractionLoader>,
        definitions: Arc<dyn DefinitionLoader>,
        cache: Arc<dyn SortKeyCache<StateResult>>,
        executor: ExecutorFactory,
    ) -> Self {
        Self {
            interactions,
            definitions,
            cache,
            kv_cache: None,
            executor,
            transport: None,
            vrf_verifier: None,
            signature_verifier: None,
            modifiers: vec![Arc::new(EvolveModifier) as Arc<dyn ExecutionContextModifier>],
            evaluator: None,
            listener: None,
        }
    }
}

/// The assembled engine. Shared behind an `Arc`; every facade and nested
/// evaluation borrows the same instance.
pub struct Engine {
    interactions: Arc<dyn InteractionLoader>,
    definitions: Arc<dyn DefinitionLoader>,
    cache: Arc<dyn SortKeyCache<StateResult>>,
    kv_cache: Option<Arc<dyn SortKeyCache<JsonValue>>>,
    executor: CachingExecutorFactory,
    transport: Option<Arc<dyn InteractionTransport>>,
    vrf_verifier: Option<Arc<dyn VrfVerifier>>,
    signature_verifier: Option<Arc<dyn SignatureVerifier>>,
    modifiers: Vec<Arc<dyn ExecutionContextModifier>>,
    evaluator: Arc<dyn StateEvaluator>,
    listener: Option<Arc<dyn EventListener>>,
    config: EngineConfig,
    stats: RwLock<EngineStats>,
}

async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = T>,
) -> Result<T, EvaluationError> {
    tokio::select! {
        () = cancel.cancelled() => Err(EvaluationError::Aborted),
        out = fut => Ok(out),
    }
}

impl Engine {
    /// Assembles an engine from its ports.
    #[must_use]
    pub fn new(deps: EngineDeps, config: EngineConfig) -> Arc<Self> {
        let evaluator = deps
            .evaluator
            .unwrap_or_else(|| Arc::new(CacheableStateEvaluator::new(Arc::clone(&deps.cache))));
        Arc::new(Self {
            interactions: deps.interactions,
            definitions: deps.definitions,
            cache: deps.cache,
            kv_cache: deps.kv_cache,
            executor: CachingExecutorFactory::new(deps.executor, config.executor_cache_capacity),
            transport: deps.transport,
            vrf_verifier: deps.vrf_verifier,
            signature_verifier: deps.signature_verifier,
            modifiers: deps.modifiers,
            evaluator,
            listener: deps.listener,
            config,
            stats: RwLock::new(EngineStats::default()),
        })
    }

    /// A facade for `contract` with the engine's default options.
    #[must_use]
    pub fn contract(self: &Arc<Self>, contract: TxId) -> Contract {
        self.contract_with_options(contract, self.config.options.clone())
    }

    /// A facade for `contract` with explicit options.
    #[must_use]
    pub fn contract_with_options(
        self: &Arc<Self>,
        contract: TxId,
        options: EvaluationOptions,
    ) -> Contract {
        Contract {
            engine: Arc::clone(self),
            contract_id: contract,
            options,
        }
    }

    /// Snapshot of the engine counters.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        self.stats.read().clone()
    }

    pub(crate) fn executor(&self) -> &CachingExecutorFactory {
        &self.executor
    }

    pub(crate) fn definitions(&self) -> &dyn DefinitionLoader {
        &*self.definitions
    }

    pub(crate) fn vrf_verifier(&self) -> Option<&dyn VrfVerifier> {
        self.vrf_verifier.as_deref()
    }

    pub(crate) fn signature_verifier(&self) -> Option<&dyn SignatureVerifier> {
        self.signature_verifier.as_deref()
    }

    pub(crate) fn modifiers(&self) -> &[Arc<dyn ExecutionContextModifier>] {
        &self.modifiers
    }

    pub(crate) fn progress_frequency(&self) -> usize {
        self.config.progress_notification_frequency
    }

    pub(crate) fn emit(&self, event: EngineEvent) {
        if let Some(listener) = &self.listener {
            listener.on_event(event);
        }
    }

    pub(crate) fn record_cache_hit(&self) {
        self.stats.write().cache_hits += 1;
    }

    pub(crate) fn record_fold(&self, folded: usize) {
        let mut stats = self.stats.write();
        stats.evaluations += 1;
        stats.interactions_applied += folded as u64;
    }

    /// Flushes the scratchpad through the cacheability gate.
    pub(crate) fn commit_scratch(
        &self,
        state: &InteractionState,
        interaction: &Interaction,
        force: bool,
    ) -> Result<(), EvaluationError> {
        state.commit(
            interaction,
            &*self.cache,
            self.kv_cache.as_deref(),
            force,
        )?;
        Ok(())
    }

    /// The synthetic interaction the constructor runs as.
    pub(crate) fn constructor_interaction(&self, definition: &ContractDefinition) -> Interaction {
        Interaction {
            id: TxId::from(crate::evaluator::base::CONSTRUCTOR_ID),
            sort_key: Some(SortKey::genesis()),
            block: BlockRef {
                height: 0,
                id: "genesis".to_string(),
                timestamp: 0,
            },
            owner_address: definition.owner.clone(),
            recipient: None,
            tags: Vec::new(),
            confirmation_status: None,
            source: None,
            dry: false,
            vrf: None,
            signature: None,
        }
    }

    /// Host capabilities for one `handle` call inside a fold.
    pub(crate) fn host(
        self: &Arc<Self>,
        contract: TxId,
        active: Interaction,
        active_sort_key: SortKey,
        ctx: &EvalContext,
    ) -> Arc<dyn HostBridge> {
        self.host_standalone(
            contract,
            active,
            active_sort_key,
            ctx.options.clone(),
            ctx.stack.clone(),
            Arc::clone(&ctx.state),
            ctx.cancel.clone(),
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn host_standalone(
        self: &Arc<Self>,
        contract: TxId,
        active: Interaction,
        active_sort_key: SortKey,
        options: EvaluationOptions,
        stack: CallStack,
        scratch: Arc<InteractionState>,
        cancel: CancellationToken,
    ) -> Arc<dyn HostBridge> {
        Arc::new(EngineHost {
            engine: Arc::clone(self),
            contract,
            active,
            active_sort_key,
            options,
            stack,
            scratch,
            cancel,
        })
    }

    /// The re-entrant evaluation entry point. Loads definition and
    /// interactions, resolves the target sort key and hands off to the
    /// configured evaluator. Boxed because nested cross-contract calls
    /// recurse through it.
    pub(crate) fn read_state_internal(
        self: &Arc<Self>,
        contract: TxId,
        sort_key: Option<SortKey>,
        options: EvaluationOptions,
        stack: CallStack,
        scratch: Arc<InteractionState>,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<(SortKey, StateResult), EvaluationError>> {
        let engine = Arc::clone(self);
        Box::pin(async move {
            if cancel.is_cancelled() {
                return Err(EvaluationError::Aborted);
            }
            if stack.depth() as u32 > options.max_call_depth {
                return Err(EvaluationError::Exception(format!(
                    "max call depth {} exceeded while evaluating {contract}",
                    options.max_call_depth
                )));
            }

            let definition =
                cancellable(&cancel, engine.definitions.load(&contract, None)).await??;
            if let Some(manifest) = &definition.manifest {
                options.check_manifest(manifest)?;
            }

            let loaded = cancellable(
                &cancel,
                engine.interactions.load(&contract, None, sort_key.as_ref()),
            )
            .await??;
            let interactions = sort_interactions(loaded);

            let target_sort_key = sort_key
                .or_else(|| {
                    interactions
                        .last()
                        .and_then(|interaction| interaction.sort_key.clone())
                })
                .unwrap_or_else(SortKey::genesis);

            let ctx = EvalContext {
                contract,
                definition,
                interactions,
                target_sort_key,
                options,
                stack,
                state: scratch,
                cancel,
            };
            engine.evaluator.eval(&engine, ctx).await
        })
    }
}

// =============================================================================
// HOST BRIDGE
// =============================================================================

/// The per-`handle` host implementation. Carries the active interaction
/// and the root call's scratchpad so every capability is transactional
/// and re-entrant.
struct EngineHost {
    engine: Arc<Engine>,
    contract: TxId,
    active: Interaction,
    active_sort_key: SortKey,
    options: EvaluationOptions,
    stack: CallStack,
    scratch: Arc<InteractionState>,
    cancel: CancellationToken,
}

impl EngineHost {
    fn pushed_stack(&self) -> CallStack {
        self.stack.push(CallFrame {
            contract: self.contract.clone(),
            interaction_id: self.active.id.clone(),
            sort_key: self.active_sort_key.clone(),
        })
    }

    fn require_kv(&self) -> Result<&Arc<dyn SortKeyCache<JsonValue>>, EvaluationError> {
        if !self.options.use_kv_storage {
            return Err(EvaluationError::Protocol(
                "kv storage is not enabled for this evaluation".to_string(),
            ));
        }
        self.engine.kv_cache.as_ref().ok_or_else(|| {
            EvaluationError::Protocol("no kv store attached to the engine".to_string())
        })
    }
}

#[async_trait]
impl HostBridge for EngineHost {
    async fn read_contract_state(
        &self,
        contract: &TxId,
        sort_key: Option<&SortKey>,
    ) -> Result<JsonValue, EvaluationError> {
        let at = sort_key.cloned().unwrap_or_else(|| self.active_sort_key.clone());
        let (_, result) = self
            .engine
            .read_state_internal(
                contract.clone(),
                Some(at),
                self.options.clone(),
                self.pushed_stack(),
                Arc::clone(&self.scratch),
                self.cancel.clone(),
            )
            .await?;
        Ok(result.state)
    }

    async fn view_contract_state(
        &self,
        contract: &TxId,
        input: JsonValue,
    ) -> Result<InteractionResult<JsonValue>, EvaluationError> {
        let (_, current) = self
            .engine
            .read_state_internal(
                contract.clone(),
                Some(self.active_sort_key.clone()),
                self.options.clone(),
                self.pushed_stack(),
                Arc::clone(&self.scratch),
                self.cancel.clone(),
            )
            .await?;

        let definition = self
            .engine
            .definitions
            .load(contract, None)
            .await
            .map_err(EvaluationError::from)?;
        let handler = self.engine.executor.create(&definition, &self.options).await?;
        let host = self.engine.host_standalone(
            contract.clone(),
            self.active.clone(),
            self.active_sort_key.clone(),
            self.options.clone(),
            self.pushed_stack(),
            Arc::clone(&self.scratch),
            self.cancel.clone(),
        );

        handler.init_state(&current.state).await;
        let call = ContractCall {
            input,
            caller: self.contract.to_string(),
            interaction_type: InteractionType::View,
        };
        handler
            .handle(
                HandleContext {
                    interaction: self.active.clone(),
                    host,
                },
                current,
                call,
            )
            .await
    }

    async fn write(&self, contract: &TxId, input: JsonValue) -> Result<(), EvaluationError> {
        if !self.options.internal_writes {
            return Err(EvaluationError::Protocol(
                "internal writes are disabled for this evaluation".to_string(),
            ));
        }

        // The target's state right before this interaction; the call
        // stack guard keeps its fold from re-entering the interaction
        // being written.
        let (_, current) = self
            .engine
            .read_state_internal(
                contract.clone(),
                Some(self.active_sort_key.clone()),
                self.options.clone(),
                self.pushed_stack(),
                Arc::clone(&self.scratch),
                self.cancel.clone(),
            )
            .await?;

        let definition = self
            .engine
            .definitions
            .load(contract, None)
            .await
            .map_err(EvaluationError::from)?;
        let handler = self.engine.executor.create(&definition, &self.options).await?;
        let host = self.engine.host_standalone(
            contract.clone(),
            self.active.clone(),
            self.active_sort_key.clone(),
            self.options.clone(),
            self.pushed_stack(),
            Arc::clone(&self.scratch),
            self.cancel.clone(),
        );

        handler.init_state(&current.state).await;
        let call = ContractCall {
            input,
            caller: self.contract.to_string(),
            interaction_type: InteractionType::Write,
        };
        let result = handler
            .handle(
                HandleContext {
                    interaction: self.active.clone(),
                    host,
                },
                current.clone(),
                call,
            )
            .await?;

        match result {
            InteractionResult::Ok { state, .. } => {
                let mut staged = current;
                staged.state = state;
                staged.record(self.active.id.clone(), true, None);
                debug!(
                    writer = %self.contract,
                    target = %contract,
                    sort_key = %self.active_sort_key,
                    "staged internal write"
                );
                self.scratch.update(
                    contract,
                    staged,
                    self.active_sort_key.clone(),
                    self.active.is_cacheable(),
                );
                Ok(())
            }
            InteractionResult::Error { error_message }
            | InteractionResult::Exception { error_message } => {
                Err(EvaluationError::contract(format!(
                    "write to {contract} rejected: {error_message}"
                )))
            }
        }
    }

    async fn refresh_state(&self) -> Result<JsonValue, EvaluationError> {
        if let Some((_, staged)) = self
            .scratch
            .get_less_or_equal(&self.contract, &self.active_sort_key)
        {
            return Ok(staged.state);
        }
        let (_, result) = self
            .engine
            .read_state_internal(
                self.contract.clone(),
                Some(self.active_sort_key.clone()),
                self.options.clone(),
                self.pushed_stack(),
                Arc::clone(&self.scratch),
                self.cancel.clone(),
            )
            .await?;
        Ok(result.state)
    }

    async fn kv_get(&self, key: &str) -> Result<Option<JsonValue>, EvaluationError> {
        let kv_cache = self.require_kv()?;
        if let Some(staged) = self
            .scratch
            .kv_get(&self.contract, key, &self.active_sort_key)
        {
            // A staged deletion hides any persisted value.
            return Ok(staged);
        }
        let persisted = kv_cache
            .get_less_or_equal(&kv_namespace(&self.contract, key), &self.active_sort_key)
            .map_err(EvaluationError::from)?;
        Ok(persisted
            .map(|entry| entry.value)
            .filter(|value| !value.is_null()))
    }

    async fn kv_put(&self, key: &str, value: JsonValue) -> Result<(), EvaluationError> {
        self.require_kv()?;
        self.scratch.kv_put(
            &self.contract,
            key,
            value,
            self.active_sort_key.clone(),
            self.active.is_cacheable(),
        );
        Ok(())
    }

    async fn kv_del(&self, key: &str) -> Result<(), EvaluationError> {
        self.require_kv()?;
        self.scratch.kv_del(
            &self.contract,
            key,
            self.active_sort_key.clone(),
            self.active.is_cacheable(),
        );
        Ok(())
    }

    async fn kv_keys(&self) -> Result<Vec<String>, EvaluationError> {
        let kv_cache = self.require_kv()?;
        let prefix = format!("{}#kv#", self.contract);

        let mut keys: Vec<String> = Vec::new();
        for namespace in kv_cache.all_contracts().map_err(EvaluationError::from)? {
            let Some(key) = namespace.as_str().strip_prefix(&prefix) else {
                continue;
            };
            let visible = kv_cache
                .get_less_or_equal(&namespace, &self.active_sort_key)
                .map_err(EvaluationError::from)?
                .map_or(false, |entry| !entry.value.is_null());
            if visible {
                keys.push(key.to_string());
            }
        }

        for (key, live) in self
            .scratch
            .kv_staged_keys(&self.contract, &self.active_sort_key)
        {
            if live {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            } else {
                keys.retain(|k| k != &key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

// =============================================================================
// CONTRACT FACADE
// =============================================================================

/// A per-call-site view of one contract.
pub struct Contract {
    engine: Arc<Engine>,
    contract_id: TxId,
    options: EvaluationOptions,
}

fn dry_interaction(contract: &TxId, sort_key: &SortKey) -> Interaction {
    Interaction {
        id: TxId::from(format!("dry-run-{contract}")),
        sort_key: Some(sort_key.clone()),
        block: BlockRef {
            height: sort_key.block_height().unwrap_or(0),
            id: "dry-block".to_string(),
            timestamp: 0,
        },
        owner_address: String::new(),
        recipient: None,
        tags: Vec::new(),
        confirmation_status: None,
        source: None,
        dry: true,
        vrf: None,
        signature: None,
    }
}

impl Contract {
    /// The contract id this facade points at.
    #[must_use]
    pub fn id(&self) -> &TxId {
        &self.contract_id
    }

    /// The options this facade evaluates with.
    #[must_use]
    pub fn options(&self) -> &EvaluationOptions {
        &self.options
    }

    async fn dry_run(
        &self,
        input: JsonValue,
        caller: Option<String>,
        interaction_type: InteractionType,
    ) -> Result<InteractionResult<JsonValue>, EvaluationError> {
        let cancel = CancellationToken::new();
        let scratch = Arc::new(InteractionState::new());
        let (sort_key, current) = self
            .engine
            .read_state_internal(
                self.contract_id.clone(),
                None,
                self.options.clone(),
                CallStack::new(),
                Arc::clone(&scratch),
                cancel.clone(),
            )
            .await?;

        let mut definition = self
            .engine
            .definitions
            .load(&self.contract_id, None)
            .await
            .map_err(EvaluationError::from)?;
        // An evolved state binds the evolved handler for views too.
        if let Some(src) = crate::domain::modifiers::evolve_source(&current.state) {
            if src != definition.src_tx_id {
                definition = self
                    .engine
                    .definitions
                    .load(&self.contract_id, Some(&src))
                    .await
                    .map_err(EvaluationError::from)?;
            }
        }
        let handler = self.engine.executor.create(&definition, &self.options).await?;

        let interaction = dry_interaction(&self.contract_id, &sort_key);
        let host = self.engine.host_standalone(
            self.contract_id.clone(),
            interaction.clone(),
            sort_key,
            self.options.clone(),
            CallStack::new(),
            scratch,
            cancel,
        );

        handler.init_state(&current.state).await;
        let call = ContractCall {
            input,
            caller: caller.unwrap_or_default(),
            interaction_type,
        };
        let handled = handler
            .handle(HandleContext { interaction, host }, current, call)
            .await;

        // Business-level failures ride inside the result; only
        // infrastructure rejects.
        match handled {
            Ok(result) => Ok(result),
            Err(EvaluationError::Contract { message, subtype })
                if !subtype.halts_evaluation() =>
            {
                Ok(InteractionResult::Error {
                    error_message: message,
                })
            }
            Err(fatal) => Err(fatal),
        }
    }
}

#[async_trait]
impl ContractApi for Contract {
    #[instrument(skip_all, fields(contract = %self.contract_id))]
    async fn read_state(
        &self,
        sort_key: Option<SortKey>,
        caller_stack: Option<CallStack>,
        signal: Option<CancellationToken>,
    ) -> Result<(SortKey, StateResult), EvaluationError> {
        let scratch = Arc::new(InteractionState::new());
        self.engine
            .read_state_internal(
                self.contract_id.clone(),
                sort_key,
                self.options.clone(),
                caller_stack.unwrap_or_default(),
                scratch,
                signal.unwrap_or_default(),
            )
            .await
    }

    async fn view_state(
        &self,
        input: JsonValue,
    ) -> Result<InteractionResult<JsonValue>, EvaluationError> {
        self.dry_run(input, None, InteractionType::View).await
    }

    async fn dry_write(
        &self,
        input: JsonValue,
        overridden_caller: Option<String>,
    ) -> Result<InteractionResult<JsonValue>, EvaluationError> {
        self.dry_run(input, overridden_caller, InteractionType::Write)
            .await
    }

    async fn write_interaction(&self, input: JsonValue) -> Result<TxId, EvaluationError> {
        let transport = self.engine.transport.as_ref().ok_or_else(|| {
            EvaluationError::Protocol("no interaction transport attached".to_string())
        })?;
        let payload = serde_json::to_string(&input)
            .map_err(|e| EvaluationError::Protocol(format!("unserializable input: {e}")))?;
        let interaction_tags = vec![
            Tag::new(tags::APP_NAME, tags::INTERACTION_APP),
            Tag::new(tags::CONTRACT, self.contract_id.as_str()),
            Tag::new(tags::INPUT, payload),
        ];
        transport.submit(&self.contract_id, interaction_tags).await
    }

    async fn current_state(&self) -> Result<JsonValue, EvaluationError> {
        let (_, result) = self.read_state(None, None, None).await?;
        Ok(result.state)
    }

    async fn current_balance(&self, target: &str) -> Result<u64, EvaluationError> {
        let state = self.current_state().await?;
        Ok(state
            .get("balances")
            .and_then(|balances| balances.get(target))
            .and_then(JsonValue::as_u64)
            .unwrap_or(0))
    }
}
