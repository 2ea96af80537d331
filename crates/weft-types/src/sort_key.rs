//! # Sort Keys
//!
//! The total order over interactions. A sort key is a string of the form
//! `<block height, zero-padded to 12>,<block time in ms, padded to 13>,<hex sha-256, 64 chars>`
//! chosen so that plain lexicographic comparison of the raw bytes equals the
//! protocol's total order. All ordering in the engine — the fold, the cache
//! range scans, the loader bounds — goes through this one representation.

use crate::interaction::{BlockRef, Interaction};
use crate::eval::TxId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Width of the padded millisecond timestamp segment.
const MS_WIDTH: usize = 13;
/// Width of the hex hash segment.
const HASH_WIDTH: usize = 64;

/// A lexicographically comparable total-order key over interactions.
///
/// `Ord` on the wrapped string is byte-wise, which is exactly the protocol
/// order. The [`SortKey::GENESIS`] key compares less than every key derived
/// from a real block, and [`SortKey::last_for_height`] produces a key
/// greater than every real key at that height.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SortKey(String);

impl SortKey {
    /// The key preceding all interactions. State cached under this key is
    /// the contract's initial state.
    pub const GENESIS: &'static str =
        "000000000000,0000000000000,0000000000000000000000000000000000000000000000000000000000000000";

    /// Returns the genesis sort key.
    #[must_use]
    pub fn genesis() -> Self {
        Self(Self::GENESIS.to_string())
    }

    /// Wraps an already-formatted key without validation.
    ///
    /// Used for keys handed back by the gateway, which emits them in the
    /// canonical format.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Derives the sort key for a transaction from its containing block.
    ///
    /// The hash segment is the SHA-256 of the block id concatenated with
    /// the transaction id, hex encoded. Deterministic across
    /// implementations as long as both ids are passed as their canonical
    /// string encodings.
    #[must_use]
    pub fn derive(block: &BlockRef, tx_id: &TxId) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(block.id.as_bytes());
        hasher.update(tx_id.as_str().as_bytes());
        let digest = hex::encode(hasher.finalize());

        let block_ms = block.timestamp.saturating_mul(1000);
        Self(format!("{:012},{block_ms:013},{digest}", block.height))
    }

    /// The greatest possible key at the given block height.
    ///
    /// Used as the upper bound when evaluating "up to height h": every real
    /// key at height `h` has a 13-digit millisecond segment below
    /// `9999999999999` and a hex hash below `z…z`.
    #[must_use]
    pub fn last_for_height(height: u64) -> Self {
        Self(format!(
            "{height:012},{},{}",
            "9".repeat(MS_WIDTH),
            "z".repeat(HASH_WIDTH),
        ))
    }

    /// The raw key string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The block height segment, if the key is well-formed.
    #[must_use]
    pub fn block_height(&self) -> Option<u64> {
        self.0.split(',').next()?.parse().ok()
    }

    /// True for the genesis key.
    #[must_use]
    pub fn is_genesis(&self) -> bool {
        self.0 == Self::GENESIS
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SortKey({})", self.0)
    }
}

impl From<&str> for SortKey {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

/// Sorts interactions into the protocol's total order.
///
/// Interactions lacking a sort key (e.g. fetched over raw GQL) are assigned
/// one derived from their block before sorting. The sort is stable, and
/// ties on the key itself — impossible by construction, defended anyway —
/// fall back to `(block.height, block.id, id)`.
#[must_use]
pub fn sort_interactions(mut interactions: Vec<Interaction>) -> Vec<Interaction> {
    for interaction in &mut interactions {
        if interaction.sort_key.is_none() {
            interaction.sort_key = Some(SortKey::derive(&interaction.block, &interaction.id));
        }
    }
    interactions.sort_by(|a, b| {
        a.sort_key
            .cmp(&b.sort_key)
            .then_with(|| a.block.height.cmp(&b.block.height))
            .then_with(|| a.block.id.cmp(&b.block.id))
            .then_with(|| a.id.cmp(&b.id))
    });
    interactions
}
