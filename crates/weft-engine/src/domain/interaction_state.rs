//! # Interaction State
//!
//! The per-root transactional scratchpad. Every state produced during one
//! `read_state` — the contract's own progression and any cross-contract
//! writes — is staged here first, keyed `(contract, sort_key)`, and only
//! reaches the persistent cache through [`InteractionState::commit`].
//!
//! A nested evaluation reads the scratchpad before the cache, so a child
//! fold observes its parents' staged updates for *any* contract. That
//! visibility is what lets write-back cycles converge instead of
//! re-deriving stale state.
//!
//! The guest-facing KV sub-store shares the same lifecycle: staged per
//! `(contract, key, sort_key)`, committed or rolled back with the rest.

use parking_lot::RwLock;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use tracing::debug;
use weft_cache::{CacheError, SortKeyCache};
use weft_types::{Interaction, SortKey, TxId};

use crate::service::StateResult;

/// One staged state, with the flag deciding whether commit may persist it.
#[derive(Clone, Debug)]
pub struct StagedEntry {
    /// The snapshot.
    pub result: StateResult,
    /// False for dry or unconfirmed interactions; such entries are only
    /// persisted under a forced commit.
    pub cacheable: bool,
}

#[derive(Clone, Debug)]
struct StagedKvWrite {
    value: Option<JsonValue>,
    cacheable: bool,
}

/// Copy-on-write staging area for one root evaluation.
#[derive(Default)]
pub struct InteractionState {
    staged: RwLock<HashMap<TxId, BTreeMap<SortKey, StagedEntry>>>,
    kv_staged: RwLock<HashMap<TxId, HashMap<String, BTreeMap<SortKey, StagedKvWrite>>>>,
}

/// Namespace under which a contract's KV key is versioned in the
/// persistent store.
#[must_use]
pub fn kv_namespace(contract: &TxId, key: &str) -> TxId {
    TxId::from(format!("{contract}#kv#{key}"))
}

impl InteractionState {
    /// An empty scratchpad.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the contract's entry when nothing is staged for it yet.
    pub fn set_initial(&self, contract: &TxId, result: StateResult, sort_key: SortKey) {
        let mut staged = self.staged.write();
        let per_contract = staged.entry(contract.clone()).or_default();
        if per_contract.is_empty() {
            per_contract.insert(
                sort_key,
                StagedEntry {
                    result,
                    cacheable: true,
                },
            );
        }
    }

    /// Stages (or overwrites) the contract's state at `sort_key`.
    pub fn update(
        &self,
        contract: &TxId,
        result: StateResult,
        sort_key: SortKey,
        cacheable: bool,
    ) {
        self.staged
            .write()
            .entry(contract.clone())
            .or_default()
            .insert(sort_key, StagedEntry { result, cacheable });
    }

    /// Exact-match read of a staged entry.
    #[must_use]
    pub fn get(&self, contract: &TxId, sort_key: &SortKey) -> Option<StateResult> {
        self.staged
            .read()
            .get(contract)
            .and_then(|per_contract| per_contract.get(sort_key))
            .map(|entry| entry.result.clone())
    }

    /// Greatest staged entry `≤ sort_key` for the contract.
    #[must_use]
    pub fn get_less_or_equal(
        &self,
        contract: &TxId,
        sort_key: &SortKey,
    ) -> Option<(SortKey, StateResult)> {
        self.staged
            .read()
            .get(contract)
            .and_then(|per_contract| {
                per_contract
                    .range((Bound::Unbounded, Bound::Included(sort_key.clone())))
                    .next_back()
            })
            .map(|(key, entry)| (key.clone(), entry.result.clone()))
    }

    /// Stages a KV write for the contract at `sort_key`.
    pub fn kv_put(
        &self,
        contract: &TxId,
        key: &str,
        value: JsonValue,
        sort_key: SortKey,
        cacheable: bool,
    ) {
        self.kv_staged
            .write()
            .entry(contract.clone())
            .or_default()
            .entry(key.to_string())
            .or_default()
            .insert(
                sort_key,
                StagedKvWrite {
                    value: Some(value),
                    cacheable,
                },
            );
    }

    /// Stages a KV deletion for the contract at `sort_key`.
    pub fn kv_del(&self, contract: &TxId, key: &str, sort_key: SortKey, cacheable: bool) {
        self.kv_staged
            .write()
            .entry(contract.clone())
            .or_default()
            .entry(key.to_string())
            .or_default()
            .insert(
                sort_key,
                StagedKvWrite {
                    value: None,
                    cacheable,
                },
            );
    }

    /// Staged KV read at `≤ sort_key`. The outer `Option` distinguishes
    /// "nothing staged" from a staged deletion (`Some(None)`).
    #[must_use]
    pub fn kv_get(
        &self,
        contract: &TxId,
        key: &str,
        sort_key: &SortKey,
    ) -> Option<Option<JsonValue>> {
        self.kv_staged
            .read()
            .get(contract)
            .and_then(|per_contract| per_contract.get(key))
            .and_then(|versions| {
                versions
                    .range((Bound::Unbounded, Bound::Included(sort_key.clone())))
                    .next_back()
            })
            .map(|(_, write)| write.value.clone())
    }

    /// Keys with a staged write visible at `≤ sort_key`, including staged
    /// deletions (the caller merges against the persistent store).
    #[must_use]
    pub fn kv_staged_keys(&self, contract: &TxId, sort_key: &SortKey) -> Vec<(String, bool)> {
        self.kv_staged
            .read()
            .get(contract)
            .map(|per_contract| {
                per_contract
                    .iter()
                    .filter_map(|(key, versions)| {
                        versions
                            .range((Bound::Unbounded, Bound::Included(sort_key.clone())))
                            .next_back()
                            .map(|(_, write)| (key.clone(), write.value.is_some()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Flushes every staged entry with sort key `≤ interaction.sort_key`
    /// to the persistent caches, subject to the cacheability gate (or
    /// unconditionally under `force`). Flushed entries leave the
    /// scratchpad; gated-out entries are dropped with them — they belong
    /// to this root call only.
    pub fn commit(
        &self,
        interaction: &Interaction,
        cache: &dyn SortKeyCache<StateResult>,
        kv_cache: Option<&dyn SortKeyCache<JsonValue>>,
        force: bool,
    ) -> Result<usize, CacheError> {
        let bound = match &interaction.sort_key {
            Some(key) => key.clone(),
            None => return Ok(0),
        };

        let mut written = 0;
        {
            let mut staged = self.staged.write();
            for (contract, per_contract) in staged.iter_mut() {
                let keep = per_contract.split_off(&bound);
                let mut flushed = std::mem::replace(per_contract, keep);
                // split_off leaves the bound itself in the tail
                if let Some(entry) = per_contract.remove(&bound) {
                    flushed.insert(bound.clone(), entry);
                }
                for (sort_key, entry) in flushed {
                    if entry.cacheable || force {
                        cache.put(contract, sort_key, entry.result)?;
                        written += 1;
                    }
                }
            }
            staged.retain(|_, per_contract| !per_contract.is_empty());
        }

        if let Some(kv_cache) = kv_cache {
            let mut kv_staged = self.kv_staged.write();
            for (contract, per_contract) in kv_staged.iter_mut() {
                for (key, versions) in per_contract.iter_mut() {
                    let keep = versions.split_off(&bound);
                    let mut flushed = std::mem::replace(versions, keep);
                    if let Some(write) = versions.remove(&bound) {
                        flushed.insert(bound.clone(), write);
                    }
                    for (sort_key, write) in flushed {
                        if write.cacheable || force {
                            let tombstone_or_value = write.value.unwrap_or(JsonValue::Null);
                            kv_cache.put(&kv_namespace(contract, key), sort_key, tombstone_or_value)?;
                            written += 1;
                        }
                    }
                }
                per_contract.retain(|_, versions| !versions.is_empty());
            }
            kv_staged.retain(|_, per_contract| !per_contract.is_empty());
        }

        debug!(
            interaction = %interaction.id,
            written,
            force,
            "committed interaction state"
        );
        Ok(written)
    }

    /// Discards everything staged, restoring the pre-evaluation view.
    pub fn rollback(&self, interaction: &Interaction) {
        debug!(interaction = %interaction.id, "rolled back interaction state");
        self.staged.write().clear();
        self.kv_staged.write().clear();
    }

    /// Number of staged state entries, across contracts.
    #[must_use]
    pub fn staged_len(&self) -> usize {
        self.staged.read().values().map(BTreeMap::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use weft_cache::MemorySortKeyCache;
    use weft_types::{BlockRef, EvalStateResult};

    fn sort_key(height: u64) -> SortKey {
        SortKey::derive(
            &BlockRef {
                height,
                id: format!("b{height}"),
                timestamp: 1_600_000_000,
            },
            &TxId::from("tx"),
        )
    }

    fn result(counter: u64) -> StateResult {
        EvalStateResult::new(json!({ "counter": counter }))
    }

    fn committing_interaction(height: u64) -> Interaction {
        Interaction::test_stub(
            "committer",
            BlockRef {
                height,
                id: format!("b{height}"),
                timestamp: 1_600_000_000,
            },
        )
    }

    #[test]
    fn test_set_initial_does_not_overwrite() {
        let state = InteractionState::new();
        let c = TxId::from("c");
        state.set_initial(&c, result(1), sort_key(1));
        state.set_initial(&c, result(99), sort_key(2));

        assert_eq!(state.get(&c, &sort_key(1)).unwrap().state["counter"], 1);
        assert!(state.get(&c, &sort_key(2)).is_none());
    }

    #[test]
    fn test_less_or_equal_sees_latest_staged() {
        let state = InteractionState::new();
        let c = TxId::from("c");
        state.update(&c, result(1), sort_key(1), true);
        state.update(&c, result(2), sort_key(2), true);

        let (key, found) = state.get_less_or_equal(&c, &sort_key(5)).unwrap();
        assert_eq!(key, sort_key(2));
        assert_eq!(found.state["counter"], 2);
        assert!(state.get_less_or_equal(&c, &SortKey::genesis()).is_none());
    }

    #[test]
    fn test_commit_respects_bound_and_gate() {
        let state = InteractionState::new();
        let cache = MemorySortKeyCache::new();
        let c = TxId::from("c");

        state.update(&c, result(1), sort_key(1), true);
        state.update(&c, result(2), sort_key(2), false); // not confirmable
        state.update(&c, result(3), sort_key(3), true); // beyond the bound

        let committed = state
            .commit(&committing_interaction(2), &cache, None, false)
            .unwrap();
        assert_eq!(committed, 1);
        assert!(cache.get(&c, &sort_key(1)).unwrap().is_some());
        assert!(cache.get(&c, &sort_key(2)).unwrap().is_none());
        assert!(cache.get(&c, &sort_key(3)).unwrap().is_none());
        // the out-of-bound entry is still staged
        assert_eq!(state.staged_len(), 1);
    }

    #[test]
    fn test_forced_commit_ignores_gate() {
        let state = InteractionState::new();
        let cache = MemorySortKeyCache::new();
        let c = TxId::from("c");
        state.update(&c, result(2), sort_key(2), false);

        let committed = state
            .commit(&committing_interaction(2), &cache, None, true)
            .unwrap();
        assert_eq!(committed, 1);
        assert!(cache.get(&c, &sort_key(2)).unwrap().is_some());
    }

    #[test]
    fn test_rollback_discards_everything() {
        let state = InteractionState::new();
        let cache = MemorySortKeyCache::new();
        let c = TxId::from("c");
        state.update(&c, result(1), sort_key(1), true);
        state.kv_put(&c, "color", json!("red"), sort_key(1), true);

        state.rollback(&committing_interaction(1));
        assert_eq!(state.staged_len(), 0);
        assert!(state.kv_get(&c, "color", &sort_key(5)).is_none());

        state
            .commit(&committing_interaction(5), &cache, None, false)
            .unwrap();
        assert!(cache.get_last(&c).unwrap().is_none());
    }

    #[test]
    fn test_kv_staging_and_commit() {
        let state = InteractionState::new();
        let cache = MemorySortKeyCache::new();
        let kv_cache = MemorySortKeyCache::new();
        let c = TxId::from("c");

        state.kv_put(&c, "color", json!("red"), sort_key(1), true);
        state.kv_del(&c, "color", sort_key(2), true);
        state.kv_put(&c, "size", json!(7), sort_key(2), true);

        // staged view: deletion wins at its sort key
        assert_eq!(state.kv_get(&c, "color", &sort_key(1)), Some(Some(json!("red"))));
        assert_eq!(state.kv_get(&c, "color", &sort_key(3)), Some(None));

        let keys = state.kv_staged_keys(&c, &sort_key(3));
        assert!(keys.contains(&("color".to_string(), false)));
        assert!(keys.contains(&("size".to_string(), true)));

        state
            .commit(&committing_interaction(3), &cache, Some(&kv_cache), false)
            .unwrap();
        let ns = kv_namespace(&c, "size");
        assert_eq!(kv_cache.get_last(&ns).unwrap().unwrap().value, json!(7));
        let ns = kv_namespace(&c, "color");
        assert_eq!(
            kv_cache.get_last(&ns).unwrap().unwrap().value,
            JsonValue::Null
        );
    }

    #[test]
    fn test_dry_interactions_never_reach_cache() {
        let state = InteractionState::new();
        let cache = MemorySortKeyCache::new();
        let c = TxId::from("c");
        state.update(&c, result(9), sort_key(9), false);

        let mut dry = committing_interaction(9);
        dry.dry = true;
        assert!(!dry.is_cacheable());
        state.commit(&dry, &cache, None, false).unwrap();
        assert!(cache.get_last(&c).unwrap().is_none());
    }
}
