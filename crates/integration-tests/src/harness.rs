//! Shared test bed: an engine over static loaders, the native sandbox
//! provider and an in-memory cache, plus the contracts the scenarios
//! deploy and a minimal HTTP server for gateway tests.

use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use weft_cache::MemorySortKeyCache;
use weft_engine::events::CollectingListener;
use weft_engine::executor::ExecutorFactory;
use weft_engine::service::{Engine, EngineConfig, EngineDeps, StateResult};
use weft_engine::test_utils::{
    native_fn, NativeHandlerFn, NativeSandboxProvider, RecordingTransport,
    StaticDefinitionLoader, StaticInteractionLoader,
};
use weft_types::{ContractType, EvaluationOptions, InteractionResult, TxId};

/// Installs a compact test subscriber; repeated calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// An engine wired to in-memory adapters, with every port reachable for
/// assertions.
pub struct TestBed {
    /// The assembled engine.
    pub engine: Arc<Engine>,
    /// Histories served to the engine.
    pub interactions: Arc<StaticInteractionLoader>,
    /// Definitions served to the engine.
    pub definitions: Arc<StaticDefinitionLoader>,
    /// Native handler registry.
    pub provider: Arc<NativeSandboxProvider>,
    /// The persistent state cache.
    pub cache: Arc<MemorySortKeyCache<StateResult>>,
    /// KV store backing `use_kv_storage` evaluations.
    pub kv_cache: Arc<MemorySortKeyCache<JsonValue>>,
    /// Captures `write_interaction` submissions.
    pub transport: Arc<RecordingTransport>,
    /// Captures progress events.
    pub listener: Arc<CollectingListener>,
}

impl TestBed {
    /// A bed with default evaluation options.
    pub fn new() -> Self {
        Self::with_options(EvaluationOptions::default())
    }

    /// A bed with explicit default options for its facades.
    pub fn with_options(options: EvaluationOptions) -> Self {
        init_tracing();
        let interactions = Arc::new(StaticInteractionLoader::new());
        let definitions = Arc::new(StaticDefinitionLoader::new());
        let provider = Arc::new(NativeSandboxProvider::new());
        let cache = Arc::new(MemorySortKeyCache::new());
        let kv_cache = Arc::new(MemorySortKeyCache::new());
        let transport = Arc::new(RecordingTransport::new());
        let listener = Arc::new(CollectingListener::new());

        let executor =
            ExecutorFactory::new().with_provider(ContractType::Js, Arc::clone(&provider));
        let mut deps = EngineDeps::new(
            Arc::clone(&interactions),
            Arc::clone(&definitions),
            Arc::clone(&cache),
            executor,
        );
        deps.kv_cache = Some(Arc::clone(&kv_cache));
        deps.transport = Some(Arc::clone(&transport));
        deps.listener = Some(Arc::clone(&listener));

        let engine = Engine::new(
            deps,
            EngineConfig {
                options,
                progress_notification_frequency: 0,
                executor_cache_capacity: 16,
            },
        );

        Self {
            engine,
            interactions,
            definitions,
            provider,
            cache,
            kv_cache,
            transport,
            listener,
        }
    }
}

impl Default for TestBed {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// NATIVE CONTRACTS
// =============================================================================

/// A PST-style token: `transfer` moves `qty` from the caller to
/// `target`, `balance` reports, `evolve` records a new source, and an
/// explicit `__init` call is rejected with a contract error.
pub fn token_contract() -> NativeHandlerFn {
    native_fn(|mut state, call, _ctx| async move {
        let function = call.input["function"].as_str().unwrap_or_default().to_string();
        match function.as_str() {
            "transfer" => {
                let Some(target) = call.input["target"].as_str().map(str::to_string) else {
                    return Ok(InteractionResult::Error {
                        error_message: "transfer needs a target".to_string(),
                    });
                };
                let qty = call.input["qty"].as_u64().unwrap_or(0);
                let from_balance = state["balances"][&call.caller].as_u64().unwrap_or(0);
                if from_balance < qty {
                    return Ok(InteractionResult::Error {
                        error_message: format!(
                            "caller {} holds {from_balance}, cannot transfer {qty}",
                            call.caller
                        ),
                    });
                }
                let to_balance = state["balances"][&target].as_u64().unwrap_or(0);
                state["balances"][&call.caller] = json!(from_balance - qty);
                state["balances"][&target] = json!(to_balance + qty);
                Ok(InteractionResult::Ok {
                    state,
                    result: JsonValue::Null,
                    gas_used: None,
                    event: None,
                })
            }
            "balance" => {
                let target = call.input["target"].as_str().unwrap_or(&call.caller);
                let balance = state["balances"][target].as_u64().unwrap_or(0);
                Ok(InteractionResult::Ok {
                    state: state.clone(),
                    result: json!({ "target": target, "balance": balance }),
                    gas_used: None,
                    event: None,
                })
            }
            "evolve" => {
                let Some(value) = call.input["value"].as_str() else {
                    return Ok(InteractionResult::Error {
                        error_message: "evolve needs a value".to_string(),
                    });
                };
                state["evolve"] = json!(value);
                Ok(InteractionResult::Ok {
                    state,
                    result: JsonValue::Null,
                    gas_used: None,
                    event: None,
                })
            }
            "__init" => Ok(InteractionResult::Error {
                error_message: "constructor cannot be invoked directly".to_string(),
            }),
            other => Ok(InteractionResult::Exception {
                error_message: format!("unknown function: {other}"),
            }),
        }
    })
}

/// The evolved token: identical except `balance` reports the held
/// amount plus 555, making the rebind observable.
pub fn token_contract_v2() -> NativeHandlerFn {
    native_fn(|state, call, _ctx| async move {
        match call.input["function"].as_str() {
            Some("balance") => {
                let target = call.input["target"].as_str().unwrap_or(&call.caller);
                let balance = state["balances"][target].as_u64().unwrap_or(0) + 555;
                Ok(InteractionResult::Ok {
                    state: state.clone(),
                    result: json!({ "target": target, "balance": balance }),
                    gas_used: None,
                    event: None,
                })
            }
            _ => Ok(InteractionResult::Ok {
                state,
                result: JsonValue::Null,
                gas_used: None,
                event: None,
            }),
        }
    })
}

/// A counter that doubles another contract through an internal write and
/// records what it read back, exercising staged-state visibility.
pub fn cycling_counter(write_target: &str) -> NativeHandlerFn {
    let write_target = TxId::from(write_target);
    native_fn(move |mut state, call, ctx| {
        let write_target = write_target.clone();
        async move {
            match call.input["function"].as_str() {
                Some("increment") => {
                    let counter = state["counter"].as_u64().unwrap_or(0);
                    state["counter"] = json!(counter + 1);
                    Ok(InteractionResult::Ok {
                        state,
                        result: JsonValue::Null,
                        gas_used: None,
                        event: None,
                    })
                }
                Some("double") => {
                    let counter = state["counter"].as_u64().unwrap_or(0);
                    state["counter"] = json!(counter * 2);
                    Ok(InteractionResult::Ok {
                        state,
                        result: JsonValue::Null,
                        gas_used: None,
                        event: None,
                    })
                }
                Some("double-other") => {
                    // write into the target, then read the staged result
                    // back through the host - the cycle the call-stack
                    // guard exists for
                    ctx.host
                        .write(&write_target, json!({ "function": "double" }))
                        .await?;
                    let observed = ctx.host.read_contract_state(&write_target, None).await?;
                    state["observed"] = observed["counter"].clone();
                    Ok(InteractionResult::Ok {
                        state,
                        result: JsonValue::Null,
                        gas_used: None,
                        event: None,
                    })
                }
                other => Ok(InteractionResult::Error {
                    error_message: format!("unknown function: {other:?}"),
                }),
            }
        }
    })
}

// =============================================================================
// MINIMAL HTTP SERVER
// =============================================================================

/// Serves canned responses for gateway tests. The responder receives the
/// request target (path + query) and returns `(status line suffix,
/// body)`.
pub async fn spawn_http<F>(responder: F) -> String
where
    F: Fn(&str) -> (u16, String) + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test server");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let mut buffer = vec![0u8; 8192];
            let mut read = 0;
            loop {
                match socket.read(&mut buffer[read..]).await {
                    Ok(0) => break,
                    Ok(n) => {
                        read += n;
                        if buffer[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                            break;
                        }
                        if read == buffer.len() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
            let request = String::from_utf8_lossy(&buffer[..read]);
            let target = request
                .lines()
                .next()
                .and_then(|line| line.split_whitespace().nth(1))
                .unwrap_or("/")
                .to_string();
            let (status, body) = responder(&target);
            let reason = match status {
                200 => "OK",
                504 => "Gateway Timeout",
                _ => "Error",
            };
            let response = format!(
                "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    format!("http://{addr}")
}
