//! # Interaction Records
//!
//! An interaction is an immutable transaction appended to the data network
//! and addressed to a contract. The engine never mutates one; it only
//! assigns a sort key when the source omitted it, and folds the record
//! through the handler.

use crate::eval::TxId;
use crate::sort_key::SortKey;
use serde::{Deserialize, Serialize};

/// Protocol-recognized transaction tag names.
///
/// Tag name matching is case-insensitive everywhere in the engine; these
/// constants carry the canonical capitalization used when writing.
pub mod tags {
    /// Marks a transaction as a contract interaction.
    pub const APP_NAME: &str = "App-Name";
    /// The `App-Name` value identifying an interaction.
    pub const INTERACTION_APP: &str = "SmartWeaveAction";
    /// Per-interaction JSON payload (`function` plus arguments).
    pub const INPUT: &str = "Input";
    /// Target contract of a direct interaction.
    pub const CONTRACT: &str = "Contract";
    /// Target contract id of an internal write.
    pub const INTERACT_WRITE: &str = "Interact-Write";
    /// Contract source content type.
    pub const CONTENT_TYPE: &str = "Content-Type";
    /// Referenced source transaction id.
    pub const CONTRACT_SRC: &str = "Contract-Src";
    /// Inline JSON initial state.
    pub const INIT_STATE: &str = "Init-State";
    /// Initial state by reference to another transaction.
    pub const INIT_STATE_TX: &str = "Init-State-TX";
    /// JSON blob of evaluation options pinned by the contract.
    pub const MANIFEST: &str = "Manifest";
    /// Minimum fee demanded by the contract deployment.
    pub const MIN_FEE: &str = "Min-Fee";
    /// Guest language of a WASM source.
    pub const WASM_LANG: &str = "Wasm-Lang";
    /// WASM ABI metadata.
    pub const WASM_META: &str = "Wasm-Meta";
    /// Marks a testnet-only contract.
    pub const TESTNET: &str = "Testnet";
    /// Accepted source replacement, carried on an interaction.
    pub const EVOLVE: &str = "Evolve";
}

/// The block an interaction was ordered into.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
    /// Block height.
    pub height: u64,
    /// Block id in its canonical string encoding.
    pub id: String,
    /// Block timestamp, seconds since epoch.
    pub timestamp: u64,
}

/// A single (name, value) transaction tag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Tag name.
    pub name: String,
    /// Tag value.
    pub value: String,
}

impl Tag {
    /// Builds a tag from anything string-like.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// The network's judgment over an interaction's finality.
///
/// Absence of a status is treated as confirmed for cacheability purposes;
/// an explicit [`ConfirmationStatus::NotProcessed`] is not.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationStatus {
    /// Not yet judged by the gateway.
    NotProcessed,
    /// Final.
    Confirmed,
    /// Known-bad: the transaction data fails verification.
    Corrupted,
    /// Ordered into an abandoned fork.
    Forked,
}

/// Where an interaction entered the network.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionSource {
    /// Posted directly to the base layer.
    Native,
    /// Posted through the sequencer.
    Sequencer,
}

/// VRF proof material attached to an interaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VrfData {
    /// The derived randomness index.
    pub index: String,
    /// The VRF proof.
    pub proof: String,
    /// The proof interpreted as a big integer, decimal encoded.
    pub bigint: String,
    /// The proving key.
    pub pubkey: String,
}

/// An immutable interaction record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
    /// Transaction id.
    pub id: TxId,
    /// Total-order key; filled by the sorter when the source omitted it.
    pub sort_key: Option<SortKey>,
    /// The containing block.
    pub block: BlockRef,
    /// Address of the wallet that signed the interaction.
    pub owner_address: String,
    /// Transaction recipient, when the interaction carries a transfer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    /// Ordered transaction tags.
    pub tags: Vec<Tag>,
    /// Gateway finality judgment, when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_status: Option<ConfirmationStatus>,
    /// Entry point into the network, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<InteractionSource>,
    /// True for synthetic interactions used by view / dry-write. Never
    /// persisted to cache.
    #[serde(default)]
    pub dry: bool,
    /// VRF proof, when the interaction requested verifiable randomness.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vrf: Option<VrfData>,
    /// Raw signature material for pluggable verifiers. Opaque to the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Interaction {
    /// First tag value with the given name, compared case-insensitively.
    #[must_use]
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
            .map(|t| t.value.as_str())
    }

    /// All tag values with the given name, in tag order.
    #[must_use]
    pub fn tag_values(&self, name: &str) -> Vec<&str> {
        self.tags
            .iter()
            .filter(|t| t.name.eq_ignore_ascii_case(name))
            .map(|t| t.value.as_str())
            .collect()
    }

    /// The raw `Input` tag payload, if present.
    #[must_use]
    pub fn input_tag(&self) -> Option<&str> {
        self.tag(tags::INPUT)
    }

    /// The contract this interaction targets directly.
    #[must_use]
    pub fn target_contract(&self) -> Option<TxId> {
        self.tag(tags::CONTRACT).map(TxId::from)
    }

    /// Contracts this interaction declares internal writes against.
    #[must_use]
    pub fn interact_write_targets(&self) -> Vec<TxId> {
        self.tag_values(tags::INTERACT_WRITE)
            .into_iter()
            .map(TxId::from)
            .collect()
    }

    /// True when the interaction may be persisted to the sort-key cache:
    /// not dry, and either unjudged or explicitly confirmed.
    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        !self.dry
            && matches!(
                self.confirmation_status,
                None | Some(ConfirmationStatus::Confirmed)
            )
    }

    /// A minimal record for tests: one block, no tags, no status.
    #[cfg(any(test, feature = "test-fixtures"))]
    #[must_use]
    pub fn test_stub(id: &str, block: BlockRef) -> Self {
        Self {
            id: TxId::from(id),
            sort_key: Some(SortKey::derive(&block, &TxId::from(id))),
            block,
            owner_address: format!("owner-of-{id}"),
            recipient: None,
            tags: Vec::new(),
            confirmation_status: None,
            source: None,
            dry: false,
            vrf: None,
            signature: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block() -> BlockRef {
        BlockRef {
            height: 1,
            id: "b1".into(),
            timestamp: 1_600_000_000,
        }
    }

    #[test]
    fn test_tag_lookup_is_case_insensitive() {
        let mut i = Interaction::test_stub("tx", block());
        i.tags.push(Tag::new("Input", r#"{"function":"noop"}"#));
        assert_eq!(i.tag("input"), Some(r#"{"function":"noop"}"#));
        assert_eq!(i.tag("INPUT"), Some(r#"{"function":"noop"}"#));
        assert_eq!(i.tag("Contract"), None);
    }

    #[test]
    fn test_interact_write_targets_collects_all() {
        let mut i = Interaction::test_stub("tx", block());
        i.tags.push(Tag::new("Interact-Write", "contract-a"));
        i.tags.push(Tag::new("Interact-Write", "contract-b"));
        let targets = i.interact_write_targets();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].as_str(), "contract-a");
    }

    #[test]
    fn test_cacheability_gate() {
        let mut i = Interaction::test_stub("tx", block());
        assert!(i.is_cacheable());

        i.confirmation_status = Some(ConfirmationStatus::Confirmed);
        assert!(i.is_cacheable());

        i.confirmation_status = Some(ConfirmationStatus::Corrupted);
        assert!(!i.is_cacheable());

        i.confirmation_status = Some(ConfirmationStatus::NotProcessed);
        assert!(!i.is_cacheable());

        i.confirmation_status = None;
        i.dry = true;
        assert!(!i.is_cacheable());
    }

    #[test]
    fn test_serde_omits_empty_optionals() {
        let i = Interaction::test_stub("tx", block());
        let json = serde_json::to_string(&i).unwrap();
        assert!(!json.contains("recipient"));
        assert!(!json.contains("vrf"));
        assert!(json.contains("sort_key"));
    }
}
