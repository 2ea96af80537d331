//! # Contract Definitions
//!
//! The resolved triple (source, initial state, metadata) for a contract id,
//! immutable per source transaction. Evolution swaps the active source id
//! from a sort key onward; it never mutates a definition in place.

use crate::eval::TxId;
use crate::options::EvaluationOptions;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// The sandbox family a definition executes under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractType {
    /// JavaScript source executed by a JS sandbox plugin.
    Js,
    /// WASM module executed through the ABI glue for its guest language.
    Wasm,
}

/// Guest language of a WASM module, from the `Wasm-Lang` tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WasmLang {
    /// Rust guests.
    Rust,
    /// AssemblyScript guests.
    AssemblyScript,
    /// Go guests.
    Go,
}

impl WasmLang {
    /// Parses the `Wasm-Lang` tag value.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "rust" => Some(Self::Rust),
            "assemblyscript" => Some(Self::AssemblyScript),
            "go" => Some(Self::Go),
            _ => None,
        }
    }
}

/// Contract source as stored on the network.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum Source {
    /// UTF-8 source text.
    Js(String),
    /// Binary module.
    Wasm(Vec<u8>),
}

impl Source {
    /// The source text, for JS definitions.
    #[must_use]
    pub fn as_js(&self) -> Option<&str> {
        match self {
            Self::Js(text) => Some(text),
            Self::Wasm(_) => None,
        }
    }
}

/// A fully resolved contract definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContractDefinition {
    /// The contract transaction id.
    pub tx_id: TxId,
    /// The active source transaction id.
    pub src_tx_id: TxId,
    /// The source itself.
    pub src: Source,
    /// Initial state the fold starts from.
    pub init_state: JsonValue,
    /// Deploying wallet address.
    pub owner: String,
    /// Minimum fee demanded by the deployment, when tagged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_fee: Option<String>,
    /// Evaluation options pinned by the contract's manifest, when tagged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<EvaluationOptions>,
    /// Sandbox family.
    pub contract_type: ContractType,
    /// Guest language for WASM sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wasm_lang: Option<WasmLang>,
    /// Opaque deployment metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonValue>,
    /// True when deployed with the testnet tag.
    #[serde(default)]
    pub testnet: bool,
}

impl ContractDefinition {
    /// Returns a copy bound to a different source, used by evolve.
    #[must_use]
    pub fn with_source(&self, src_tx_id: TxId, src: Source) -> Self {
        Self {
            src_tx_id,
            src,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wasm_lang_parse() {
        assert_eq!(WasmLang::parse("Rust"), Some(WasmLang::Rust));
        assert_eq!(WasmLang::parse("assemblyscript"), Some(WasmLang::AssemblyScript));
        assert_eq!(WasmLang::parse("zig"), None);
    }

    #[test]
    fn test_with_source_swaps_only_the_source() {
        let def = ContractDefinition {
            tx_id: TxId::from("contract"),
            src_tx_id: TxId::from("src-1"),
            src: Source::Js("export function handle() {}".into()),
            init_state: json!({"counter": 0}),
            owner: "owner".into(),
            min_fee: None,
            manifest: None,
            contract_type: ContractType::Js,
            wasm_lang: None,
            metadata: None,
            testnet: false,
        };
        let evolved = def.with_source(TxId::from("src-2"), Source::Js("v2".into()));
        assert_eq!(evolved.tx_id, def.tx_id);
        assert_eq!(evolved.init_state, def.init_state);
        assert_eq!(evolved.src_tx_id.as_str(), "src-2");
        assert_eq!(evolved.src.as_js(), Some("v2"));
    }
}
