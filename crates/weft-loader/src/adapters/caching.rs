//! Memoizing loader wrappers.
//!
//! One evaluation may ask for a contract's interactions many times —
//! once per nested `read_state` during internal writes. The caching
//! wrapper keeps the full per-contract list from the first load and only
//! goes back to the network when a later call extends past the cached
//! tail, fetching just the missing suffix.

use crate::errors::LoaderError;
use crate::ports::{DefinitionLoader, InteractionLoader};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;
use weft_types::{ContractDefinition, Interaction, SortKey, TxId};

/// [`InteractionLoader`] wrapper memoizing full interaction lists per
/// contract.
pub struct CachingInteractionLoader<L> {
    inner: L,
    cached: Mutex<HashMap<TxId, Vec<Interaction>>>,
}

impl<L> CachingInteractionLoader<L> {
    /// Wraps `inner`.
    pub fn new(inner: L) -> Self {
        Self {
            inner,
            cached: Mutex::new(HashMap::new()),
        }
    }

    fn slice_range(
        interactions: &[Interaction],
        from: Option<&SortKey>,
        to: Option<&SortKey>,
    ) -> Vec<Interaction> {
        interactions
            .iter()
            .filter(|i| {
                let key = i.sort_key.as_ref();
                from.map_or(true, |lower| key > Some(lower))
                    && to.map_or(true, |upper| key <= Some(upper))
            })
            .cloned()
            .collect()
    }
}

#[async_trait]
impl<L: InteractionLoader> InteractionLoader for CachingInteractionLoader<L> {
    async fn load(
        &self,
        contract: &TxId,
        from: Option<&SortKey>,
        to: Option<&SortKey>,
    ) -> Result<Vec<Interaction>, LoaderError> {
        let mut cached = self.cached.lock().await;

        match cached.get_mut(contract) {
            None => {
                // First sight of this contract: load its whole history up
                // to `to` so later calls can be served from memory.
                let full = self.inner.load(contract, None, to).await?;
                let result = Self::slice_range(&full, from, to);
                cached.insert(contract.clone(), full);
                Ok(result)
            }
            Some(known) => {
                let tail = known.last().and_then(|i| i.sort_key.clone());
                let needs_extension = match (&tail, to) {
                    (_, None) => true,
                    (None, Some(_)) => true,
                    (Some(last), Some(upper)) => upper > last,
                };
                if needs_extension {
                    let fresh = self.inner.load(contract, tail.as_ref(), to).await?;
                    debug!(
                        contract = %contract,
                        appended = fresh.len(),
                        "extended cached interaction list"
                    );
                    known.extend(fresh);
                }
                Ok(Self::slice_range(known, from, to))
            }
        }
    }
}

/// [`DefinitionLoader`] wrapper memoizing definitions by
/// `(contract, forced source)`.
pub struct CachingDefinitionLoader<L> {
    inner: L,
    cached: Mutex<HashMap<(TxId, Option<TxId>), ContractDefinition>>,
}

impl<L> CachingDefinitionLoader<L> {
    /// Wraps `inner`.
    pub fn new(inner: L) -> Self {
        Self {
            inner,
            cached: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl<L: DefinitionLoader> DefinitionLoader for CachingDefinitionLoader<L> {
    async fn load(
        &self,
        contract: &TxId,
        forced_src_tx_id: Option<&TxId>,
    ) -> Result<ContractDefinition, LoaderError> {
        let cache_key = (contract.clone(), forced_src_tx_id.cloned());
        let mut cached = self.cached.lock().await;
        if let Some(definition) = cached.get(&cache_key) {
            return Ok(definition.clone());
        }
        let definition = self.inner.load(contract, forced_src_tx_id).await?;
        cached.insert(cache_key, definition.clone());
        Ok(definition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use weft_types::BlockRef;

    struct CountingLoader {
        interactions: Vec<Interaction>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl InteractionLoader for CountingLoader {
        async fn load(
            &self,
            _contract: &TxId,
            from: Option<&SortKey>,
            to: Option<&SortKey>,
        ) -> Result<Vec<Interaction>, LoaderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .interactions
                .iter()
                .filter(|i| {
                    let key = i.sort_key.as_ref();
                    from.map_or(true, |lower| key > Some(lower))
                        && to.map_or(true, |upper| key <= Some(upper))
                })
                .cloned()
                .collect())
        }
    }

    fn interaction(height: u64, id: &str) -> Interaction {
        Interaction::test_stub(
            id,
            BlockRef {
                height,
                id: format!("b{height}"),
                timestamp: 1_600_000_000 + height,
            },
        )
    }

    fn sort_key_of(i: &Interaction) -> SortKey {
        i.sort_key.clone().unwrap()
    }

    #[tokio::test]
    async fn test_second_call_is_served_from_memory() {
        let all = vec![interaction(1, "a"), interaction(2, "b")];
        let upper = sort_key_of(&all[1]);
        let loader = CachingInteractionLoader::new(CountingLoader {
            interactions: all,
            calls: AtomicUsize::new(0),
        });
        let contract = TxId::from("c");

        let first = loader.load(&contract, None, Some(&upper)).await.unwrap();
        let second = loader.load(&contract, None, Some(&upper)).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(loader.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_extension_fetches_only_the_suffix() {
        let all = vec![interaction(1, "a"), interaction(2, "b"), interaction(3, "c")];
        let (mid, last) = (sort_key_of(&all[1]), sort_key_of(&all[2]));
        let loader = CachingInteractionLoader::new(CountingLoader {
            interactions: all,
            calls: AtomicUsize::new(0),
        });
        let contract = TxId::from("c");

        let first = loader.load(&contract, None, Some(&mid)).await.unwrap();
        assert_eq!(first.len(), 2);

        let extended = loader.load(&contract, None, Some(&last)).await.unwrap();
        assert_eq!(extended.len(), 3);
        assert_eq!(loader.inner.calls.load(Ordering::SeqCst), 2);

        // the lower bound is applied to the memoized list
        let suffix = loader
            .load(&contract, Some(&mid), Some(&last))
            .await
            .unwrap();
        assert_eq!(suffix.len(), 1);
        assert_eq!(suffix[0].id.as_str(), "c");
        assert_eq!(loader.inner.calls.load(Ordering::SeqCst), 2);
    }
}
