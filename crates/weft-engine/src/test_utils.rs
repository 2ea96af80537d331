//! # Test Fixtures
//!
//! In-process stand-ins for the engine's ports: a native handler that
//! runs Rust closures instead of a sandboxed guest, static loaders
//! serving hand-built histories, and a recording transport. Production
//! hosts plug real sandbox providers and network loaders into the same
//! ports.

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use weft_loader::{DefinitionLoader, InteractionLoader, LoaderError};
use weft_types::{
    BlockRef, ConfirmationStatus, ContractCall, ContractDefinition, ContractType,
    EvaluationError, EvaluationOptions, Interaction, InteractionResult, SortKey, Source, Tag,
    TxId,
};

use crate::ports::outbound::{
    HandleContext, HandlerApi, InteractionTransport, SandboxProvider,
};
use crate::service::StateResult;

// =============================================================================
// NATIVE HANDLER
// =============================================================================

/// A contract implemented as a Rust closure: `(state, call, ctx) →
/// result`.
pub type NativeHandlerFn = Arc<
    dyn Fn(
            JsonValue,
            ContractCall,
            HandleContext,
        ) -> BoxFuture<'static, Result<InteractionResult<JsonValue>, EvaluationError>>
        + Send
        + Sync,
>;

/// Boxes an async closure into a [`NativeHandlerFn`].
pub fn native_fn<F, Fut>(f: F) -> NativeHandlerFn
where
    F: Fn(JsonValue, ContractCall, HandleContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<InteractionResult<JsonValue>, EvaluationError>> + Send + 'static,
{
    Arc::new(move |state, call, ctx| Box::pin(f(state, call, ctx)))
}

/// [`HandlerApi`] over a [`NativeHandlerFn`]. Stateless between
/// interactions: the fold passes the current state explicitly, so
/// `init_state` has nothing to reseed.
pub struct NativeHandler {
    func: NativeHandlerFn,
}

impl NativeHandler {
    /// Wraps `func`.
    #[must_use]
    pub fn new(func: NativeHandlerFn) -> Self {
        Self { func }
    }
}

#[async_trait]
impl HandlerApi for NativeHandler {
    async fn init_state(&self, _state: &JsonValue) {}

    async fn handle(
        &self,
        ctx: HandleContext,
        current: StateResult,
        call: ContractCall,
    ) -> Result<InteractionResult<JsonValue>, EvaluationError> {
        (self.func)(current.state, call, ctx).await
    }

    async fn maybe_call_state_constructor(
        &self,
        initial_state: JsonValue,
        ctx: HandleContext,
    ) -> Result<JsonValue, EvaluationError> {
        let call = ContractCall {
            input: json!({ "function": "__init" }),
            caller: ctx.interaction.owner_address.clone(),
            interaction_type: weft_types::InteractionType::Write,
        };
        match (self.func)(initial_state, call, ctx).await? {
            InteractionResult::Ok { state, .. } => Ok(state),
            InteractionResult::Error { error_message }
            | InteractionResult::Exception { error_message } => {
                Err(EvaluationError::contract(error_message))
            }
        }
    }
}

/// [`SandboxProvider`] dispatching on the definition's source text:
/// tests register a closure under a marker string and deploy contracts
/// whose `Source::Js` is that marker.
#[derive(Default)]
pub struct NativeSandboxProvider {
    handlers: RwLock<HashMap<String, NativeHandlerFn>>,
}

impl NativeSandboxProvider {
    /// An empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the handler for a source marker.
    pub fn register(&self, source_marker: impl Into<String>, func: NativeHandlerFn) {
        self.handlers.write().insert(source_marker.into(), func);
    }
}

#[async_trait]
impl SandboxProvider for NativeSandboxProvider {
    async fn instantiate(
        &self,
        definition: &ContractDefinition,
        _options: &EvaluationOptions,
    ) -> Result<Arc<dyn HandlerApi>, EvaluationError> {
        let Source::Js(marker) = &definition.src else {
            return Err(EvaluationError::Protocol(
                "native provider only instantiates js sources".to_string(),
            ));
        };
        let func = self.handlers.read().get(marker).cloned().ok_or_else(|| {
            EvaluationError::Protocol(format!("no native handler registered for '{marker}'"))
        })?;
        Ok(Arc::new(NativeHandler::new(func)))
    }
}

// =============================================================================
// STATIC LOADERS
// =============================================================================

/// [`InteractionLoader`] serving hand-built histories from memory.
#[derive(Default)]
pub struct StaticInteractionLoader {
    interactions: RwLock<HashMap<TxId, Vec<Interaction>>>,
}

impl StaticInteractionLoader {
    /// An empty loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an interaction to a contract's history. The same record
    /// can be pushed to several contracts, as the gateway does for
    /// internal writes.
    pub fn push(&self, contract: &TxId, interaction: Interaction) {
        self.interactions
            .write()
            .entry(contract.clone())
            .or_default()
            .push(interaction);
    }
}

#[async_trait]
impl InteractionLoader for StaticInteractionLoader {
    async fn load(
        &self,
        contract: &TxId,
        from: Option<&SortKey>,
        to: Option<&SortKey>,
    ) -> Result<Vec<Interaction>, LoaderError> {
        let all = self
            .interactions
            .read()
            .get(contract)
            .cloned()
            .unwrap_or_default();
        Ok(all
            .into_iter()
            .filter(|i| {
                let key = i.sort_key.as_ref();
                from.map_or(true, |lower| key > Some(lower))
                    && to.map_or(true, |upper| key <= Some(upper))
            })
            .collect())
    }
}

/// [`DefinitionLoader`] serving registered definitions, including
/// evolved sources under their forced source id.
#[derive(Default)]
pub struct StaticDefinitionLoader {
    definitions: RwLock<HashMap<(TxId, Option<TxId>), ContractDefinition>>,
}

impl StaticDefinitionLoader {
    /// An empty loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a contract's current definition.
    pub fn insert(&self, definition: ContractDefinition) {
        self.definitions
            .write()
            .insert((definition.tx_id.clone(), None), definition);
    }

    /// Registers the definition served when `definition.src_tx_id` is
    /// forced (the evolve path).
    pub fn insert_evolved(&self, definition: ContractDefinition) {
        self.definitions.write().insert(
            (definition.tx_id.clone(), Some(definition.src_tx_id.clone())),
            definition,
        );
    }
}

#[async_trait]
impl DefinitionLoader for StaticDefinitionLoader {
    async fn load(
        &self,
        contract: &TxId,
        forced_src_tx_id: Option<&TxId>,
    ) -> Result<ContractDefinition, LoaderError> {
        let key = (contract.clone(), forced_src_tx_id.cloned());
        self.definitions
            .read()
            .get(&key)
            .cloned()
            .ok_or_else(|| {
                LoaderError::Protocol(format!(
                    "no definition registered for {contract} (forced: {forced_src_tx_id:?})"
                ))
            })
    }
}

/// [`InteractionTransport`] recording submissions instead of signing
/// anything.
#[derive(Default)]
pub struct RecordingTransport {
    submitted: Mutex<Vec<(TxId, Vec<Tag>)>>,
    counter: Mutex<u64>,
}

impl RecordingTransport {
    /// An empty transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything submitted so far.
    #[must_use]
    pub fn submissions(&self) -> Vec<(TxId, Vec<Tag>)> {
        self.submitted.lock().clone()
    }
}

#[async_trait]
impl InteractionTransport for RecordingTransport {
    async fn submit(&self, contract: &TxId, tags: Vec<Tag>) -> Result<TxId, EvaluationError> {
        let mut counter = self.counter.lock();
        *counter += 1;
        let id = TxId::from(format!("submitted-{counter}"));
        self.submitted.lock().push((contract.clone(), tags));
        Ok(id)
    }
}

// =============================================================================
// RECORD BUILDERS
// =============================================================================

/// A JS contract definition whose source text is a marker resolved by
/// [`NativeSandboxProvider`].
#[must_use]
pub fn js_definition(contract: &str, src_marker: &str, init_state: JsonValue) -> ContractDefinition {
    ContractDefinition {
        tx_id: TxId::from(contract),
        src_tx_id: TxId::from(format!("src-{src_marker}")),
        src: Source::Js(src_marker.to_string()),
        init_state,
        owner: format!("owner-of-{contract}"),
        min_fee: None,
        manifest: None,
        contract_type: ContractType::Js,
        wasm_lang: None,
        metadata: None,
        testnet: false,
    }
}

/// Builder for interaction records in tests.
pub struct InteractionBuilder {
    id: String,
    height: u64,
    owner: String,
    tags: Vec<Tag>,
    confirmation_status: Option<ConfirmationStatus>,
    dry: bool,
}

impl InteractionBuilder {
    /// An interaction `id` at block height `height`.
    #[must_use]
    pub fn new(id: &str, height: u64) -> Self {
        Self {
            id: id.to_string(),
            height,
            owner: format!("wallet-{id}"),
            tags: Vec::new(),
            confirmation_status: None,
            dry: false,
        }
    }

    /// Sets the signing wallet.
    #[must_use]
    pub fn owner(mut self, owner: &str) -> Self {
        self.owner = owner.to_string();
        self
    }

    /// Targets a contract directly.
    #[must_use]
    pub fn contract(mut self, contract: &str) -> Self {
        self.tags.push(Tag::new(weft_types::tags::CONTRACT, contract));
        self
    }

    /// Sets the input payload.
    #[must_use]
    pub fn input(mut self, input: &JsonValue) -> Self {
        self.tags
            .push(Tag::new(weft_types::tags::INPUT, input.to_string()));
        self
    }

    /// Declares an internal write against a contract.
    #[must_use]
    pub fn interact_write(mut self, contract: &str) -> Self {
        self.tags
            .push(Tag::new(weft_types::tags::INTERACT_WRITE, contract));
        self
    }

    /// Sets the gateway confirmation status.
    #[must_use]
    pub fn status(mut self, status: ConfirmationStatus) -> Self {
        self.confirmation_status = Some(status);
        self
    }

    /// Marks the interaction dry.
    #[must_use]
    pub fn dry(mut self) -> Self {
        self.dry = true;
        self
    }

    /// Builds the record with a derived sort key.
    #[must_use]
    pub fn build(self) -> Interaction {
        let block = BlockRef {
            height: self.height,
            id: format!("block-{}", self.height),
            timestamp: 1_600_000_000 + self.height,
        };
        let id = TxId::from(self.id.as_str());
        Interaction {
            sort_key: Some(SortKey::derive(&block, &id)),
            id,
            block,
            owner_address: self.owner,
            recipient: None,
            tags: self.tags,
            confirmation_status: self.confirmation_status,
            source: None,
            dry: self.dry,
            vrf: None,
            signature: None,
        }
    }
}
