//! # Loader Ports
//!
//! The boundaries the engine folds through. Adapters in this crate
//! implement the interaction side; the raw transaction source stays a
//! port because the underlying network client belongs to the host.

use crate::errors::LoaderError;
use async_trait::async_trait;
use weft_types::{ContractDefinition, Interaction, SortKey, Tag, TxId};

/// Loads the interactions of a contract inside a sort-key range.
///
/// The returned list covers `(from, to]` — exclusive of `from`, inclusive
/// of `to` — with both bounds optional. Implementations either return the
/// complete range or fail; a partial list is never returned.
#[async_trait]
pub trait InteractionLoader: Send + Sync {
    /// Loads interactions for `contract` in `(from, to]`.
    async fn load(
        &self,
        contract: &TxId,
        from: Option<&SortKey>,
        to: Option<&SortKey>,
    ) -> Result<Vec<Interaction>, LoaderError>;
}

/// Resolves a contract id to its definition.
#[async_trait]
pub trait DefinitionLoader: Send + Sync {
    /// Loads the definition of `contract`, optionally forcing a specific
    /// source transaction (used by evolve).
    async fn load(
        &self,
        contract: &TxId,
        forced_src_tx_id: Option<&TxId>,
    ) -> Result<ContractDefinition, LoaderError>;
}

/// A transaction header as read from the network.
#[derive(Clone, Debug)]
pub struct NetworkTransaction {
    /// Transaction id.
    pub id: TxId,
    /// Address of the signing wallet.
    pub owner_address: String,
    /// Transaction tags.
    pub tags: Vec<Tag>,
}

impl NetworkTransaction {
    /// First tag value with the given name, compared case-insensitively.
    #[must_use]
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
            .map(|t| t.value.as_str())
    }
}

/// Raw access to network transactions and their data payloads.
///
/// The concrete HTTP/GQL client is the host's concern; the definition
/// loader only consumes this boundary.
#[async_trait]
pub trait TransactionSource: Send + Sync {
    /// Reads a transaction header.
    async fn transaction(&self, id: &TxId) -> Result<NetworkTransaction, LoaderError>;

    /// Reads a transaction's data payload.
    async fn transaction_data(&self, id: &TxId) -> Result<Vec<u8>, LoaderError>;
}
