//! In-memory sort-key cache for unit tests and short-lived processes.
//!
//! Semantics match the RocksDB adapter exactly; the nested `BTreeMap`
//! gives the same lexicographic range behavior the persistent key layout
//! does.

use crate::errors::CacheError;
use crate::ports::{CacheEntry, SortKeyCache};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;
use weft_types::{SortKey, TxId};

/// In-memory [`SortKeyCache`] backed by `BTreeMap`s under a single lock.
///
/// The lock spans whole operations, so per-contract range lookups are
/// atomic relative to concurrent puts.
#[derive(Default)]
pub struct MemorySortKeyCache<V> {
    entries: RwLock<BTreeMap<TxId, BTreeMap<SortKey, V>>>,
}

impl<V> MemorySortKeyCache<V> {
    /// An empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of entries across all contracts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().values().map(BTreeMap::len).sum()
    }

    /// True when no entry is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Clone + Send + Sync> SortKeyCache<V> for MemorySortKeyCache<V> {
    fn get(
        &self,
        contract: &TxId,
        sort_key: &SortKey,
    ) -> Result<Option<CacheEntry<V>>, CacheError> {
        Ok(self
            .entries
            .read()
            .get(contract)
            .and_then(|per_contract| per_contract.get(sort_key))
            .map(|value| CacheEntry {
                sort_key: sort_key.clone(),
                value: value.clone(),
            }))
    }

    fn get_last(&self, contract: &TxId) -> Result<Option<CacheEntry<V>>, CacheError> {
        Ok(self
            .entries
            .read()
            .get(contract)
            .and_then(|per_contract| per_contract.last_key_value())
            .map(|(key, value)| CacheEntry {
                sort_key: key.clone(),
                value: value.clone(),
            }))
    }

    fn get_less_or_equal(
        &self,
        contract: &TxId,
        sort_key: &SortKey,
    ) -> Result<Option<CacheEntry<V>>, CacheError> {
        Ok(self
            .entries
            .read()
            .get(contract)
            .and_then(|per_contract| {
                per_contract
                    .range((Bound::Unbounded, Bound::Included(sort_key.clone())))
                    .next_back()
            })
            .map(|(key, value)| CacheEntry {
                sort_key: key.clone(),
                value: value.clone(),
            }))
    }

    fn put(&self, contract: &TxId, sort_key: SortKey, value: V) -> Result<(), CacheError> {
        self.entries
            .write()
            .entry(contract.clone())
            .or_default()
            .insert(sort_key, value);
        Ok(())
    }

    fn delete_contract(&self, contract: &TxId) -> Result<(), CacheError> {
        self.entries.write().remove(contract);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<(TxId, SortKey)>, CacheError> {
        Ok(self
            .entries
            .read()
            .iter()
            .flat_map(|(contract, per_contract)| {
                per_contract
                    .keys()
                    .map(|key| (contract.clone(), key.clone()))
            })
            .collect())
    }

    fn all_contracts(&self) -> Result<Vec<TxId>, CacheError> {
        Ok(self.entries.read().keys().cloned().collect())
    }

    fn dump(&self) -> Result<Vec<(TxId, SortKey, V)>, CacheError> {
        Ok(self
            .entries
            .read()
            .iter()
            .flat_map(|(contract, per_contract)| {
                per_contract
                    .iter()
                    .map(|(key, value)| (contract.clone(), key.clone(), value.clone()))
            })
            .collect())
    }

    fn prune(&self, retain: usize) -> Result<usize, CacheError> {
        let mut removed = 0;
        let mut entries = self.entries.write();
        for per_contract in entries.values_mut() {
            while per_contract.len() > retain {
                let oldest = match per_contract.first_key_value() {
                    Some((key, _)) => key.clone(),
                    None => break,
                };
                per_contract.remove(&oldest);
                removed += 1;
            }
        }
        entries.retain(|_, per_contract| !per_contract.is_empty());
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_types::{BlockRef, SortKey};

    fn key(height: u64, tx: &str) -> SortKey {
        SortKey::derive(
            &BlockRef {
                height,
                id: format!("block-{height}"),
                timestamp: 1_600_000_000 + height,
            },
            &TxId::from(tx),
        )
    }

    fn contract(name: &str) -> TxId {
        TxId::from(name)
    }

    #[test]
    fn test_exact_get_and_overwrite() {
        let cache = MemorySortKeyCache::new();
        let c = contract("c1");
        let k = key(10, "a");

        cache.put(&c, k.clone(), 1u32).unwrap();
        cache.put(&c, k.clone(), 2u32).unwrap();

        let entry = cache.get(&c, &k).unwrap().unwrap();
        assert_eq!(entry.value, 2);
        assert_eq!(entry.sort_key, k);
        assert!(cache.get(&c, &key(11, "b")).unwrap().is_none());
    }

    #[test]
    fn test_last_and_less_or_equal() {
        let cache = MemorySortKeyCache::new();
        let c = contract("c1");
        let (k10, k20, k30) = (key(10, "a"), key(20, "b"), key(30, "c"));

        cache.put(&c, k10.clone(), 10u32).unwrap();
        cache.put(&c, k20.clone(), 20u32).unwrap();
        cache.put(&c, k30.clone(), 30u32).unwrap();

        assert_eq!(cache.get_last(&c).unwrap().unwrap().value, 30);

        let le = cache.get_less_or_equal(&c, &key(25, "x")).unwrap().unwrap();
        assert_eq!(le.sort_key, k20);
        assert_eq!(le.value, 20);

        // inclusive upper bound
        let le = cache.get_less_or_equal(&c, &k20).unwrap().unwrap();
        assert_eq!(le.value, 20);

        // nothing at or below the genesis key
        assert!(cache
            .get_less_or_equal(&c, &SortKey::genesis())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_contract_isolation() {
        let cache = MemorySortKeyCache::new();
        cache.put(&contract("a"), key(10, "i"), 1u32).unwrap();
        cache.put(&contract("b"), key(20, "j"), 2u32).unwrap();

        assert!(cache.get_last(&contract("a")).unwrap().is_some());
        cache.delete_contract(&contract("a")).unwrap();
        assert!(cache.get_last(&contract("a")).unwrap().is_none());
        assert_eq!(cache.get_last(&contract("b")).unwrap().unwrap().value, 2);
    }

    #[test]
    fn test_prune_retains_most_recent() {
        let cache = MemorySortKeyCache::new();
        let c = contract("c1");
        for height in 1..=5 {
            cache.put(&c, key(height, "i"), height).unwrap();
        }

        let removed = cache.prune(2).unwrap();
        assert_eq!(removed, 3);

        let kept: Vec<u64> = cache.dump().unwrap().into_iter().map(|(_, _, v)| v).collect();
        assert_eq!(kept, vec![4, 5]);
    }

    #[test]
    fn test_keys_and_all_contracts() {
        let cache = MemorySortKeyCache::new();
        cache.put(&contract("a"), key(1, "i"), 0u32).unwrap();
        cache.put(&contract("a"), key(2, "j"), 0u32).unwrap();
        cache.put(&contract("b"), key(3, "k"), 0u32).unwrap();

        assert_eq!(cache.keys().unwrap().len(), 3);
        assert_eq!(cache.all_contracts().unwrap().len(), 2);
    }
}
