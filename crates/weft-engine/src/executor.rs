//! # Executor Factory
//!
//! Turns a contract definition into a live handler: policy checks first
//! (blacklist, source allowlist, determinism constraints), then dispatch
//! to the sandbox provider registered for the contract type. The caching
//! variant shares compiled handlers across contracts with identical
//! source.

use lru::LruCache;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, warn};
use weft_types::{
    ContractDefinition, ContractErrorSubtype, ContractType, EvaluationError, EvaluationOptions,
    Source, TxId, UnsafeClientPolicy,
};

use crate::ports::outbound::{ContractBlacklist, HandlerApi, SandboxProvider};

/// Marker whose presence in a source means the contract reaches for the
/// non-deterministic client API.
const UNSAFE_CLIENT_MARKER: &str = "unsafeClient";

/// Checks the determinism constraints the engine enforces on sources.
fn check_source_determinism(
    definition: &ContractDefinition,
    options: &EvaluationOptions,
) -> Result<(), EvaluationError> {
    let Source::Js(text) = &definition.src else {
        return Ok(());
    };

    if !options.allow_big_int && text.contains("BigInt") {
        return Err(EvaluationError::Protocol(format!(
            "source {} uses BigInt and allowBigInt is not set",
            definition.src_tx_id
        )));
    }

    if text.contains(UNSAFE_CLIENT_MARKER) {
        match options.unsafe_client {
            UnsafeClientPolicy::Allow => {
                warn!(
                    src = %definition.src_tx_id,
                    "source references the unsafe client; evaluating anyway"
                );
            }
            UnsafeClientPolicy::Skip => {
                return Err(EvaluationError::Contract {
                    message: format!(
                        "source {} references the unsafe client",
                        definition.src_tx_id
                    ),
                    subtype: ContractErrorSubtype::UnsafeClientSkip,
                });
            }
            UnsafeClientPolicy::Throw => {
                return Err(EvaluationError::Protocol(format!(
                    "source {} references the unsafe client",
                    definition.src_tx_id
                )));
            }
        }
    }
    Ok(())
}

/// Builds handlers for definitions, enforcing evaluation policy on the
/// way.
#[derive(Default)]
pub struct ExecutorFactory {
    providers: HashMap<ContractType, Arc<dyn SandboxProvider>>,
    blacklist: Option<Arc<dyn ContractBlacklist>>,
}

impl ExecutorFactory {
    /// An empty factory; register providers before use.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the sandbox provider for a contract type.
    #[must_use]
    pub fn with_provider(
        mut self,
        contract_type: ContractType,
        provider: Arc<dyn SandboxProvider>,
    ) -> Self {
        self.providers.insert(contract_type, provider);
        self
    }

    /// Attaches a contract blacklist.
    #[must_use]
    pub fn with_blacklist(mut self, blacklist: Arc<dyn ContractBlacklist>) -> Self {
        self.blacklist = Some(blacklist);
        self
    }

    /// Runs every policy gate without instantiating.
    pub async fn check_policy(
        &self,
        definition: &ContractDefinition,
        options: &EvaluationOptions,
    ) -> Result<(), EvaluationError> {
        if let Some(blacklist) = &self.blacklist {
            if blacklist.is_blacklisted(&definition.tx_id).await {
                return Err(EvaluationError::Contract {
                    message: format!("contract {} is blacklisted", definition.tx_id),
                    subtype: ContractErrorSubtype::BlacklistedSkip,
                });
            }
        }

        if !options.whitelist_sources.is_empty()
            && !options.whitelist_sources.contains(&definition.src_tx_id)
        {
            return Err(EvaluationError::Contract {
                message: format!(
                    "source {} is not on the allowlist",
                    definition.src_tx_id
                ),
                subtype: ContractErrorSubtype::NonWhitelistedSource,
            });
        }

        check_source_determinism(definition, options)
    }

    /// Checks policy and instantiates a handler.
    pub async fn create(
        &self,
        definition: &ContractDefinition,
        options: &EvaluationOptions,
    ) -> Result<Arc<dyn HandlerApi>, EvaluationError> {
        self.check_policy(definition, options).await?;
        let provider = self
            .providers
            .get(&definition.contract_type)
            .ok_or_else(|| {
                EvaluationError::Protocol(format!(
                    "no sandbox provider registered for {:?} contracts",
                    definition.contract_type
                ))
            })?;
        provider.instantiate(definition, options).await
    }
}

/// [`ExecutorFactory`] wrapper sharing compiled handlers by source id.
///
/// Policy gates run on every call — the blacklist keys on the contract,
/// not the source — but instantiation is skipped when a handler for the
/// same `src_tx_id` is already live.
pub struct CachingExecutorFactory {
    inner: ExecutorFactory,
    handlers: Mutex<LruCache<TxId, Arc<dyn HandlerApi>>>,
}

impl CachingExecutorFactory {
    /// Wraps `inner`, keeping at most `capacity` compiled handlers.
    #[must_use]
    pub fn new(inner: ExecutorFactory, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            handlers: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Checks policy, then returns the shared handler for the source,
    /// instantiating on first sight.
    pub async fn create(
        &self,
        definition: &ContractDefinition,
        options: &EvaluationOptions,
    ) -> Result<Arc<dyn HandlerApi>, EvaluationError> {
        self.inner.check_policy(definition, options).await?;

        if let Some(handler) = self.handlers.lock().get(&definition.src_tx_id) {
            return Ok(Arc::clone(handler));
        }

        let handler = self.inner.create(definition, options).await?;
        debug!(src = %definition.src_tx_id, "compiled handler cached");
        self.handlers
            .lock()
            .put(definition.src_tx_id.clone(), Arc::clone(&handler));
        Ok(handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::outbound::{HandleContext, HandlerApi};
    use crate::service::StateResult;
    use async_trait::async_trait;
    use serde_json::{json, Value as JsonValue};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use weft_types::{ContractCall, InteractionResult};

    struct NoopHandler;

    #[async_trait]
    impl HandlerApi for NoopHandler {
        async fn init_state(&self, _state: &JsonValue) {}

        async fn handle(
            &self,
            _ctx: HandleContext,
            current: StateResult,
            _call: ContractCall,
        ) -> Result<InteractionResult<JsonValue>, EvaluationError> {
            Ok(InteractionResult::Ok {
                state: current.state,
                result: JsonValue::Null,
                gas_used: None,
                event: None,
            })
        }

        async fn maybe_call_state_constructor(
            &self,
            initial_state: JsonValue,
            _ctx: HandleContext,
        ) -> Result<JsonValue, EvaluationError> {
            Ok(initial_state)
        }
    }

    struct CountingProvider(AtomicUsize);

    #[async_trait]
    impl SandboxProvider for CountingProvider {
        async fn instantiate(
            &self,
            _definition: &ContractDefinition,
            _options: &EvaluationOptions,
        ) -> Result<Arc<dyn HandlerApi>, EvaluationError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(NoopHandler))
        }
    }

    fn definition(src_tx: &str, src: &str) -> ContractDefinition {
        ContractDefinition {
            tx_id: TxId::from("contract"),
            src_tx_id: TxId::from(src_tx),
            src: Source::Js(src.to_string()),
            init_state: json!({}),
            owner: "owner".into(),
            min_fee: None,
            manifest: None,
            contract_type: ContractType::Js,
            wasm_lang: None,
            metadata: None,
            testnet: false,
        }
    }

    #[tokio::test]
    async fn test_unregistered_type_is_rejected() {
        let factory = ExecutorFactory::new();
        let err = factory
            .create(&definition("src", "handle()"), &EvaluationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EvaluationError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_big_int_gate() {
        let provider = Arc::new(CountingProvider(AtomicUsize::new(0)));
        let factory = ExecutorFactory::new().with_provider(ContractType::Js, provider);
        let def = definition("src", "const x = BigInt(1)");

        let err = factory
            .create(&def, &EvaluationOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("BigInt"));

        let allowing = EvaluationOptions {
            allow_big_int: true,
            ..EvaluationOptions::default()
        };
        assert!(factory.create(&def, &allowing).await.is_ok());
    }

    #[tokio::test]
    async fn test_unsafe_client_policies() {
        let provider = Arc::new(CountingProvider(AtomicUsize::new(0)));
        let factory = ExecutorFactory::new().with_provider(ContractType::Js, provider);
        let def = definition("src", "host.unsafeClient.fetch()");

        let throw = factory.create(&def, &EvaluationOptions::default()).await;
        assert!(matches!(throw, Err(EvaluationError::Protocol(_))));

        let skip_opts = EvaluationOptions {
            unsafe_client: UnsafeClientPolicy::Skip,
            ..EvaluationOptions::default()
        };
        match factory.create(&def, &skip_opts).await {
            Err(EvaluationError::Contract { subtype, .. }) => {
                assert_eq!(subtype, ContractErrorSubtype::UnsafeClientSkip);
            }
            other => panic!("expected skip contract error, got {other:?}"),
        }

        let allow_opts = EvaluationOptions {
            unsafe_client: UnsafeClientPolicy::Allow,
            ..EvaluationOptions::default()
        };
        assert!(factory.create(&def, &allow_opts).await.is_ok());
    }

    #[tokio::test]
    async fn test_allowlist_gate() {
        let provider = Arc::new(CountingProvider(AtomicUsize::new(0)));
        let factory = ExecutorFactory::new().with_provider(ContractType::Js, provider);
        let def = definition("src-1", "handle()");

        let restricted = EvaluationOptions {
            whitelist_sources: vec![TxId::from("src-2")],
            ..EvaluationOptions::default()
        };
        match factory.create(&def, &restricted).await {
            Err(EvaluationError::Contract { subtype, .. }) => {
                assert_eq!(subtype, ContractErrorSubtype::NonWhitelistedSource);
            }
            other => panic!("expected allowlist rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_caching_factory_shares_by_source() {
        let provider = Arc::new(CountingProvider(AtomicUsize::new(0)));
        let counter = Arc::clone(&provider);
        let factory = CachingExecutorFactory::new(
            ExecutorFactory::new().with_provider(ContractType::Js, provider),
            8,
        );
        let opts = EvaluationOptions::default();

        factory.create(&definition("src-1", "a()"), &opts).await.unwrap();
        factory.create(&definition("src-1", "a()"), &opts).await.unwrap();
        factory.create(&definition("src-2", "b()"), &opts).await.unwrap();

        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }
}
