//! Invariant tests: determinism, cache transparency, incremental
//! equivalence, the cacheability gate and constructor exactness.

#[cfg(test)]
mod tests {
    use crate::harness::{token_contract, TestBed};
    use serde_json::json;
    use std::sync::Arc;
    use weft_cache::{RocksCacheConfig, RocksSortKeyCache, SortKeyCache};
    use weft_engine::executor::ExecutorFactory;
    use weft_engine::ports::inbound::ContractApi;
    use weft_engine::service::{Engine, EngineConfig, EngineDeps};
    use weft_engine::test_utils::{
        js_definition, native_fn, InteractionBuilder, NativeSandboxProvider,
        StaticDefinitionLoader, StaticInteractionLoader,
    };
    use weft_types::{
        canonical_json, ConfirmationStatus, ContractType, EvaluationOptions, Interaction,
        InteractionResult, TxId,
    };

    const TOKEN: &str = "token-contract";
    const WALLET_W: &str = "wallet-w";
    const WALLET_X: &str = "wallet-x";

    fn transfer(id: &str, height: u64, qty: u64) -> Interaction {
        InteractionBuilder::new(id, height)
            .owner(WALLET_W)
            .contract(TOKEN)
            .input(&json!({"function": "transfer", "target": WALLET_X, "qty": qty}))
            .build()
    }

    fn token_bed(history: Vec<Interaction>) -> TestBed {
        let bed = TestBed::new();
        bed.provider.register("token-v1", token_contract());
        bed.definitions.insert(js_definition(
            TOKEN,
            "token-v1",
            json!({"balances": { WALLET_W: 1_000, WALLET_X: 0 }}),
        ));
        for interaction in history {
            bed.interactions.push(&TxId::from(TOKEN), interaction);
        }
        bed
    }

    #[tokio::test]
    async fn test_determinism_is_independent_of_fetch_order() {
        let (i1, i2, i3) = (transfer("t1", 10, 1), transfer("t2", 20, 2), transfer("t3", 30, 3));

        let forward = token_bed(vec![i1.clone(), i2.clone(), i3.clone()]);
        let shuffled = token_bed(vec![i3, i1, i2]);

        let contract = TxId::from(TOKEN);
        let (key_a, result_a) = forward
            .engine
            .contract(contract.clone())
            .read_state(None, None, None)
            .await
            .unwrap();
        let (key_b, result_b) = shuffled
            .engine
            .contract(contract)
            .read_state(None, None, None)
            .await
            .unwrap();

        assert_eq!(key_a, key_b);
        assert_eq!(
            canonical_json(&result_a).unwrap(),
            canonical_json(&result_b).unwrap()
        );
        let order: Vec<&str> = result_a.validity.keys().map(TxId::as_str).collect();
        assert_eq!(order, vec!["t1", "t2", "t3"]);
    }

    #[tokio::test]
    async fn test_cache_transparency_cold_vs_warm() {
        let bed = token_bed(vec![transfer("t1", 10, 5), transfer("t2", 20, 7)]);
        let contract = bed.engine.contract(TxId::from(TOKEN));

        let cold = contract.read_state(None, None, None).await.unwrap();
        let warm = contract.read_state(None, None, None).await.unwrap();

        assert_eq!(cold, warm);
        assert!(bed.engine.stats().cache_hits >= 1);
    }

    #[tokio::test]
    async fn test_incremental_equivalence() {
        let (i1, i2) = (transfer("t1", 10, 5), transfer("t2", 20, 7));
        let k1 = i1.sort_key.clone().unwrap();
        let k2 = i2.sort_key.clone().unwrap();

        let stepped = token_bed(vec![i1.clone(), i2.clone()]);
        let contract = stepped.engine.contract(TxId::from(TOKEN));
        let (_, partial) = contract
            .read_state(Some(k1), None, None)
            .await
            .unwrap();
        assert_eq!(partial.state["balances"][WALLET_X], 5);
        let (_, resumed) = contract
            .read_state(Some(k2.clone()), None, None)
            .await
            .unwrap();

        let fresh = token_bed(vec![i1, i2]);
        let (_, scratch) = fresh
            .engine
            .contract(TxId::from(TOKEN))
            .read_state(Some(k2), None, None)
            .await
            .unwrap();

        assert_eq!(
            canonical_json(&resumed.state).unwrap(),
            canonical_json(&scratch.state).unwrap()
        );
        assert_eq!(resumed.validity, scratch.validity);
    }

    #[tokio::test]
    async fn test_unconfirmed_interactions_never_reach_the_cache() {
        let confirmed = InteractionBuilder::new("ok-1", 10)
            .owner(WALLET_W)
            .contract(TOKEN)
            .input(&json!({"function": "transfer", "target": WALLET_X, "qty": 1}))
            .status(ConfirmationStatus::Confirmed)
            .build();
        let pending = InteractionBuilder::new("pending-1", 20)
            .owner(WALLET_W)
            .contract(TOKEN)
            .input(&json!({"function": "transfer", "target": WALLET_X, "qty": 2}))
            .status(ConfirmationStatus::NotProcessed)
            .build();
        let pending_key = pending.sort_key.clone().unwrap();

        let bed = token_bed(vec![confirmed, pending]);
        let contract = bed.engine.contract(TxId::from(TOKEN));
        let (_, result) = contract.read_state(None, None, None).await.unwrap();

        // both folded into the result...
        assert_eq!(result.state["balances"][WALLET_X], 3);
        assert_eq!(result.validity.len(), 2);

        // ...but the unconfirmed tail is never a cache key
        let cached = bed.cache.keys().unwrap();
        assert!(cached.iter().all(|(_, key)| *key != pending_key));
        assert!(!cached.is_empty());
    }

    #[tokio::test]
    async fn test_constructor_runs_exactly_once_and_first() {
        let options = EvaluationOptions {
            use_constructor: true,
            ..EvaluationOptions::default()
        };
        let bed = TestBed::with_options(options);
        let contract_id = TxId::from("ctor-contract");

        bed.provider.register(
            "ctor-source",
            native_fn(|mut state, call, _ctx| async move {
                match call.input["function"].as_str() {
                    Some("__init") => {
                        state["counter"] = json!(10);
                        state["deployer"] = json!(call.caller);
                        Ok(InteractionResult::Ok {
                            state,
                            result: serde_json::Value::Null,
                            gas_used: None,
                            event: None,
                        })
                    }
                    Some("increment") => {
                        let counter = state["counter"].as_u64().unwrap_or(0);
                        state["counter"] = json!(counter + 1);
                        Ok(InteractionResult::Ok {
                            state,
                            result: serde_json::Value::Null,
                            gas_used: None,
                            event: None,
                        })
                    }
                    _ => Ok(InteractionResult::Error {
                        error_message: "unknown".to_string(),
                    }),
                }
            }),
        );
        bed.definitions
            .insert(js_definition("ctor-contract", "ctor-source", json!({})));
        bed.interactions.push(
            &contract_id,
            InteractionBuilder::new("inc-1", 10)
                .contract("ctor-contract")
                .input(&json!({"function": "increment"}))
                .build(),
        );

        let contract = bed.engine.contract(contract_id);
        let (_, result) = contract.read_state(None, None, None).await.unwrap();

        let keys: Vec<&str> = result.validity.keys().map(TxId::as_str).collect();
        assert_eq!(keys, vec!["__init", "inc-1"]);
        assert_eq!(result.state["counter"], 11);
        assert_eq!(result.state["deployer"], "owner-of-ctor-contract");

        // warm read: the constructor verdict survives, still exactly once
        let (_, warm) = contract.read_state(None, None, None).await.unwrap();
        let occurrences = warm
            .validity
            .keys()
            .filter(|id| id.as_str() == "__init")
            .count();
        assert_eq!(occurrences, 1);
        assert!(warm.validity.keys().next().map(TxId::as_str) == Some("__init"));
    }

    #[tokio::test]
    async fn test_state_survives_engine_restart_via_rocks_cache() {
        let dir = tempfile::tempdir().unwrap();
        let history = vec![transfer("t1", 10, 5)];

        let run = |history: Vec<Interaction>| {
            let path = dir.path().to_string_lossy().to_string();
            async move {
                let interactions = Arc::new(StaticInteractionLoader::new());
                for interaction in history {
                    interactions.push(&TxId::from(TOKEN), interaction);
                }
                let definitions = Arc::new(StaticDefinitionLoader::new());
                definitions.insert(js_definition(
                    TOKEN,
                    "token-v1",
                    json!({"balances": { WALLET_W: 1_000, WALLET_X: 0 }}),
                ));
                let provider = Arc::new(NativeSandboxProvider::new());
                provider.register("token-v1", token_contract());
                let cache = Arc::new(
                    RocksSortKeyCache::<weft_engine::service::StateResult>::open(
                        RocksCacheConfig::for_testing(path),
                    )
                    .unwrap(),
                );
                let engine = Engine::new(
                    EngineDeps::new(
                        interactions,
                        definitions,
                        cache,
                        ExecutorFactory::new().with_provider(
                            ContractType::Js,
                            provider,
                        ),
                    ),
                    EngineConfig::default(),
                );
                let contract = engine.contract(TxId::from(TOKEN));
                let result = contract.read_state(None, None, None).await.unwrap();
                (engine.stats(), result)
            }
        };

        let (first_stats, first) = run(history.clone()).await;
        assert_eq!(first_stats.cache_hits, 0);

        let (second_stats, second) = run(history).await;
        assert_eq!(second_stats.cache_hits, 1);
        assert_eq!(first.1, second.1);
    }
}
