//! # Cache Port
//!
//! The interface the evaluator depends on. Adapters implement this trait;
//! the engine never names a concrete backend.

use crate::errors::CacheError;
use weft_types::{SortKey, TxId};

/// A stored entry returned together with the key it was found under, which
/// for [`SortKeyCache::get_less_or_equal`] may be earlier than the
/// requested key.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheEntry<V> {
    /// The sort key the value is stored under.
    pub sort_key: SortKey,
    /// The stored value.
    pub value: V,
}

/// A mapping `(contract, sort_key) → V`, totally ordered by sort key
/// within each contract.
///
/// Range lookups are atomic with respect to concurrent `put`s to the same
/// contract; cross-contract operations need not be linearizable. Entries
/// are superseded by later keys but never overwritten by earlier ones —
/// pruning is the only deletion path besides [`SortKeyCache::delete_contract`].
pub trait SortKeyCache<V>: Send + Sync {
    /// Exact-match lookup.
    fn get(&self, contract: &TxId, sort_key: &SortKey) -> Result<Option<CacheEntry<V>>, CacheError>;

    /// The entry under the greatest stored sort key for the contract.
    fn get_last(&self, contract: &TxId) -> Result<Option<CacheEntry<V>>, CacheError>;

    /// The entry under the greatest stored key `≤ sort_key`.
    fn get_less_or_equal(
        &self,
        contract: &TxId,
        sort_key: &SortKey,
    ) -> Result<Option<CacheEntry<V>>, CacheError>;

    /// Stores a value, overwriting any value already at that key.
    fn put(&self, contract: &TxId, sort_key: SortKey, value: V) -> Result<(), CacheError>;

    /// Drops every entry for the contract.
    fn delete_contract(&self, contract: &TxId) -> Result<(), CacheError>;

    /// Every `(contract, sort_key)` pair currently stored.
    fn keys(&self) -> Result<Vec<(TxId, SortKey)>, CacheError>;

    /// Every contract with at least one entry.
    fn all_contracts(&self) -> Result<Vec<TxId>, CacheError>;

    /// Every stored entry. Intended for diagnostics and migration, not the
    /// evaluation path.
    fn dump(&self) -> Result<Vec<(TxId, SortKey, V)>, CacheError>;

    /// Retains the `retain` most recent entries per contract (by sort key
    /// descending) and deletes the rest. Returns the number of entries
    /// removed.
    fn prune(&self, retain: usize) -> Result<usize, CacheError>;
}
