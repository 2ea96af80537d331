//! Contract definition loader.
//!
//! Resolves a contract transaction and its referenced source transaction
//! into a [`ContractDefinition`], parsing the protocol tag registry and
//! enforcing the content-type and environment gates.

use crate::errors::LoaderError;
use crate::ports::{DefinitionLoader, NetworkTransaction, TransactionSource};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::debug;
use weft_types::{
    tags, ContractDefinition, ContractType, EvaluationOptions, Source, TxId, WasmLang,
};

const CONTENT_TYPE_JS: &str = "application/javascript";
const CONTENT_TYPE_WASM: &str = "application/wasm";

/// [`DefinitionLoader`] reading through a [`TransactionSource`].
pub struct ContractDefinitionLoader<T> {
    source: T,
    testnet_mode: bool,
}

impl<T> ContractDefinitionLoader<T> {
    /// Builds a loader. `testnet_mode` must match the deployment
    /// environment of every contract this loader resolves.
    pub fn new(source: T, testnet_mode: bool) -> Self {
        Self {
            source,
            testnet_mode,
        }
    }
}

fn parse_content_type(src_tx: &NetworkTransaction) -> Result<ContractType, LoaderError> {
    match src_tx.tag(tags::CONTENT_TYPE) {
        Some(CONTENT_TYPE_JS) => Ok(ContractType::Js),
        Some(CONTENT_TYPE_WASM) => Ok(ContractType::Wasm),
        Some(other) => Err(LoaderError::Protocol(format!(
            "unsupported contract content type: {other}"
        ))),
        None => Err(LoaderError::Protocol(format!(
            "source {} carries no content type",
            src_tx.id
        ))),
    }
}

fn parse_manifest(raw: Option<&str>) -> Result<Option<EvaluationOptions>, LoaderError> {
    match raw {
        Some(json) => {
            let options = serde_json::from_str(json).map_err(|e| {
                LoaderError::Protocol(format!("malformed contract manifest: {e}"))
            })?;
            Ok(Some(options))
        }
        None => Ok(None),
    }
}

impl<T: TransactionSource> ContractDefinitionLoader<T> {
    async fn init_state(
        &self,
        contract_tx: &NetworkTransaction,
    ) -> Result<JsonValue, LoaderError> {
        // Preference order: inline tag, referenced transaction, then the
        // contract transaction's own data.
        if let Some(inline) = contract_tx.tag(tags::INIT_STATE) {
            return Ok(serde_json::from_str(inline)
                .map_err(|e| LoaderError::Protocol(format!("malformed inline init state: {e}")))?);
        }
        let data = if let Some(reference) = contract_tx.tag(tags::INIT_STATE_TX) {
            self.source
                .transaction_data(&TxId::from(reference))
                .await?
        } else {
            self.source.transaction_data(&contract_tx.id).await?
        };
        serde_json::from_slice(&data)
            .map_err(|e| LoaderError::Protocol(format!("malformed init state data: {e}")))
    }

    fn check_environment(&self, contract_tx: &NetworkTransaction) -> Result<bool, LoaderError> {
        let testnet = contract_tx.tag(tags::TESTNET).is_some();
        if testnet && !self.testnet_mode {
            return Err(LoaderError::Protocol(format!(
                "contract {} is a testnet contract but the engine runs in mainnet mode",
                contract_tx.id
            )));
        }
        if !testnet && self.testnet_mode {
            return Err(LoaderError::Protocol(format!(
                "contract {} is a mainnet contract but the engine runs in testnet mode",
                contract_tx.id
            )));
        }
        Ok(testnet)
    }
}

#[async_trait]
impl<T: TransactionSource> DefinitionLoader for ContractDefinitionLoader<T> {
    async fn load(
        &self,
        contract: &TxId,
        forced_src_tx_id: Option<&TxId>,
    ) -> Result<ContractDefinition, LoaderError> {
        let contract_tx = self.source.transaction(contract).await?;
        let testnet = self.check_environment(&contract_tx)?;

        let src_tx_id = match forced_src_tx_id {
            Some(forced) => forced.clone(),
            None => contract_tx
                .tag(tags::CONTRACT_SRC)
                .map(TxId::from)
                .ok_or_else(|| {
                    LoaderError::Protocol(format!(
                        "contract {contract} carries no source reference"
                    ))
                })?,
        };

        let src_tx = self.source.transaction(&src_tx_id).await?;
        let contract_type = parse_content_type(&src_tx)?;
        let src_data = self.source.transaction_data(&src_tx_id).await?;
        let src = match contract_type {
            ContractType::Js => Source::Js(String::from_utf8(src_data).map_err(|_| {
                LoaderError::Protocol(format!("source {src_tx_id} is not valid utf-8"))
            })?),
            ContractType::Wasm => Source::Wasm(src_data),
        };

        let wasm_lang = match contract_type {
            ContractType::Wasm => {
                let raw = src_tx.tag(tags::WASM_LANG).ok_or_else(|| {
                    LoaderError::Protocol(format!("wasm source {src_tx_id} carries no language tag"))
                })?;
                Some(WasmLang::parse(raw).ok_or_else(|| {
                    LoaderError::Protocol(format!("unsupported wasm language: {raw}"))
                })?)
            }
            ContractType::Js => None,
        };

        let metadata = match src_tx.tag(tags::WASM_META) {
            Some(raw) => Some(serde_json::from_str(raw).map_err(|e| {
                LoaderError::Protocol(format!("malformed wasm metadata: {e}"))
            })?),
            None => None,
        };

        let init_state = self.init_state(&contract_tx).await?;
        let manifest = parse_manifest(contract_tx.tag(tags::MANIFEST))?;

        debug!(
            contract = %contract,
            src = %src_tx_id,
            contract_type = ?contract_type,
            "definition loaded"
        );

        Ok(ContractDefinition {
            tx_id: contract.clone(),
            src_tx_id,
            src,
            init_state,
            owner: contract_tx.owner_address.clone(),
            min_fee: contract_tx.tag(tags::MIN_FEE).map(str::to_string),
            manifest,
            contract_type,
            wasm_lang,
            metadata,
            testnet,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use weft_types::Tag;

    #[derive(Default)]
    struct StubSource {
        transactions: HashMap<TxId, NetworkTransaction>,
        data: HashMap<TxId, Vec<u8>>,
    }

    impl StubSource {
        fn with_transaction(mut self, id: &str, tags: Vec<Tag>) -> Self {
            self.transactions.insert(
                TxId::from(id),
                NetworkTransaction {
                    id: TxId::from(id),
                    owner_address: format!("owner-of-{id}"),
                    tags,
                },
            );
            self
        }

        fn with_data(mut self, id: &str, data: &[u8]) -> Self {
            self.data.insert(TxId::from(id), data.to_vec());
            self
        }
    }

    #[async_trait]
    impl TransactionSource for StubSource {
        async fn transaction(&self, id: &TxId) -> Result<NetworkTransaction, LoaderError> {
            self.transactions
                .get(id)
                .cloned()
                .ok_or_else(|| LoaderError::Http {
                    status: 404,
                    message: format!("transaction {id} not found"),
                })
        }

        async fn transaction_data(&self, id: &TxId) -> Result<Vec<u8>, LoaderError> {
            self.data
                .get(id)
                .cloned()
                .ok_or_else(|| LoaderError::Http {
                    status: 404,
                    message: format!("data of {id} not found"),
                })
        }
    }

    fn js_source(src_id: &str) -> StubSource {
        StubSource::default()
            .with_transaction(
                src_id,
                vec![Tag::new("Content-Type", "application/javascript")],
            )
            .with_data(src_id, b"export function handle(state, action) {}")
    }

    #[tokio::test]
    async fn test_loads_js_definition_with_inline_state() {
        let source = js_source("src-1").with_transaction(
            "contract-1",
            vec![
                Tag::new("Contract-Src", "src-1"),
                Tag::new("Init-State", r#"{"counter": 1}"#),
            ],
        );
        let loader = ContractDefinitionLoader::new(source, false);

        let definition = loader.load(&TxId::from("contract-1"), None).await.unwrap();
        assert_eq!(definition.contract_type, ContractType::Js);
        assert_eq!(definition.init_state["counter"], 1);
        assert_eq!(definition.src_tx_id.as_str(), "src-1");
        assert_eq!(definition.owner, "owner-of-contract-1");
        assert!(definition.src.as_js().unwrap().contains("handle"));
    }

    #[tokio::test]
    async fn test_init_state_falls_back_to_referenced_tx_then_data() {
        let by_reference = js_source("src-1")
            .with_transaction(
                "contract-1",
                vec![
                    Tag::new("Contract-Src", "src-1"),
                    Tag::new("Init-State-TX", "state-tx"),
                ],
            )
            .with_data("state-tx", br#"{"from": "reference"}"#);
        let loader = ContractDefinitionLoader::new(by_reference, false);
        let definition = loader.load(&TxId::from("contract-1"), None).await.unwrap();
        assert_eq!(definition.init_state["from"], "reference");

        let by_data = js_source("src-1")
            .with_transaction("contract-2", vec![Tag::new("Contract-Src", "src-1")])
            .with_data("contract-2", br#"{"from": "data"}"#);
        let loader = ContractDefinitionLoader::new(by_data, false);
        let definition = loader.load(&TxId::from("contract-2"), None).await.unwrap();
        assert_eq!(definition.init_state["from"], "data");
    }

    #[tokio::test]
    async fn test_rejects_unsupported_content_type() {
        let source = StubSource::default()
            .with_transaction("src-1", vec![Tag::new("Content-Type", "text/plain")])
            .with_data("src-1", b"nope")
            .with_transaction(
                "contract-1",
                vec![
                    Tag::new("Contract-Src", "src-1"),
                    Tag::new("Init-State", "{}"),
                ],
            );
        let loader = ContractDefinitionLoader::new(source, false);
        let err = loader
            .load(&TxId::from("contract-1"), None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unsupported contract content type"));
    }

    #[tokio::test]
    async fn test_environment_mismatch_is_fatal_both_ways() {
        let testnet_contract = js_source("src-1").with_transaction(
            "contract-1",
            vec![
                Tag::new("Contract-Src", "src-1"),
                Tag::new("Init-State", "{}"),
                Tag::new("Testnet", "true"),
            ],
        );
        let mainnet_loader = ContractDefinitionLoader::new(testnet_contract, false);
        assert!(mainnet_loader
            .load(&TxId::from("contract-1"), None)
            .await
            .is_err());

        let mainnet_contract = js_source("src-1").with_transaction(
            "contract-2",
            vec![
                Tag::new("Contract-Src", "src-1"),
                Tag::new("Init-State", "{}"),
            ],
        );
        let testnet_loader = ContractDefinitionLoader::new(mainnet_contract, true);
        assert!(testnet_loader
            .load(&TxId::from("contract-2"), None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_forced_source_overrides_tag() {
        let source = js_source("src-2").with_transaction(
            "contract-1",
            vec![
                Tag::new("Contract-Src", "src-1"),
                Tag::new("Init-State", "{}"),
            ],
        );
        let loader = ContractDefinitionLoader::new(source, false);
        let definition = loader
            .load(&TxId::from("contract-1"), Some(&TxId::from("src-2")))
            .await
            .unwrap();
        assert_eq!(definition.src_tx_id.as_str(), "src-2");
    }
}
