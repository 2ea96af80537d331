//! RocksDB-backed sort-key cache.
//!
//! Entries are stored under `!<contract>!<sort_key>` keys; the `!`
//! delimiters keep each contract's entries in one contiguous,
//! lexicographically sorted namespace, so `get_last` and
//! `get_less_or_equal` are single reverse seeks.

use crate::errors::CacheError;
use crate::ports::{CacheEntry, SortKeyCache};
use parking_lot::RwLock;
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use serde::{de::DeserializeOwned, Serialize};
use std::marker::PhantomData;
use std::path::Path;
use tracing::debug;
use weft_types::{SortKey, TxId};

/// Delimiter framing the contract id inside a storage key. Contract ids on
/// the network are base64url and can never contain it.
const NAMESPACE_DELIMITER: char = '!';

/// RocksDB tuning for the cache.
#[derive(Debug, Clone)]
pub struct RocksCacheConfig {
    /// Database directory.
    pub path: String,
    /// Write buffer size in bytes.
    pub write_buffer_size: usize,
    /// fsync after each write.
    pub sync_writes: bool,
}

impl Default for RocksCacheConfig {
    fn default() -> Self {
        Self {
            path: "./data/weft-cache".to_string(),
            write_buffer_size: 32 * 1024 * 1024,
            sync_writes: true,
        }
    }
}

impl RocksCacheConfig {
    /// Config for tests: small buffers, no fsync.
    pub fn for_testing(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            write_buffer_size: 4 * 1024 * 1024,
            sync_writes: false,
        }
    }
}

/// Persistent [`SortKeyCache`] over RocksDB.
///
/// Values are stored as canonical JSON so caches produced by different
/// engine builds stay byte-comparable. The store lock makes same-contract
/// range lookups atomic relative to puts; cross-contract linearizability
/// is not promised and not needed.
pub struct RocksSortKeyCache<V> {
    db: RwLock<DB>,
    config: RocksCacheConfig,
    _value: PhantomData<fn() -> V>,
}

impl<V> RocksSortKeyCache<V> {
    /// Opens or creates the database.
    pub fn open(config: RocksCacheConfig) -> Result<Self, CacheError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(config.write_buffer_size);
        opts.set_compression_type(rocksdb::DBCompressionType::Snappy);

        let db = DB::open(&opts, &config.path)
            .map_err(|e| CacheError::Storage(format!("failed to open cache db: {e}")))?;
        debug!(path = %config.path, "opened sort-key cache");

        Ok(Self {
            db: RwLock::new(db),
            config,
            _value: PhantomData,
        })
    }

    /// Opens with default tuning at the given path.
    pub fn open_default(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        Self::open(RocksCacheConfig {
            path: path.as_ref().to_string_lossy().to_string(),
            ..RocksCacheConfig::default()
        })
    }

    fn write_opts(&self) -> rocksdb::WriteOptions {
        let mut opts = rocksdb::WriteOptions::default();
        opts.set_sync(self.config.sync_writes);
        opts
    }
}

fn storage_key(contract: &TxId, sort_key: &SortKey) -> Vec<u8> {
    format!("{NAMESPACE_DELIMITER}{contract}{NAMESPACE_DELIMITER}{sort_key}").into_bytes()
}

fn contract_prefix(contract: &TxId) -> Vec<u8> {
    format!("{NAMESPACE_DELIMITER}{contract}{NAMESPACE_DELIMITER}").into_bytes()
}

/// The smallest key strictly greater than every key of the contract's
/// namespace: `"` is the character after `!`.
fn contract_upper_bound(contract: &TxId) -> Vec<u8> {
    format!("{NAMESPACE_DELIMITER}{contract}\"").into_bytes()
}

fn parse_key(raw: &[u8]) -> Result<(TxId, SortKey), CacheError> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| CacheError::MalformedKey(String::from_utf8_lossy(raw).into_owned()))?;
    let rest = text
        .strip_prefix(NAMESPACE_DELIMITER)
        .ok_or_else(|| CacheError::MalformedKey(text.to_string()))?;
    let (contract, sort_key) = rest
        .split_once(NAMESPACE_DELIMITER)
        .ok_or_else(|| CacheError::MalformedKey(text.to_string()))?;
    Ok((TxId::from(contract), SortKey::new(sort_key)))
}

impl<V> RocksSortKeyCache<V>
where
    V: Serialize + DeserializeOwned + Send + Sync,
{
    fn decode(&self, sort_key: SortKey, bytes: &[u8]) -> Result<CacheEntry<V>, CacheError> {
        let value = serde_json::from_slice(bytes)?;
        Ok(CacheEntry { sort_key, value })
    }

    /// Reverse seek from `upper`, returning the first entry still inside
    /// the contract's namespace.
    fn seek_at_most(
        &self,
        db: &DB,
        contract: &TxId,
        upper: &[u8],
    ) -> Result<Option<CacheEntry<V>>, CacheError> {
        let prefix = contract_prefix(contract);
        let mut iter = db.iterator(IteratorMode::From(upper, Direction::Reverse));
        match iter.next() {
            Some(entry) => {
                let (key, value) = entry?;
                if !key.starts_with(&prefix) {
                    return Ok(None);
                }
                let (_, sort_key) = parse_key(&key)?;
                Ok(Some(self.decode(sort_key, &value)?))
            }
            None => Ok(None),
        }
    }
}

impl<V> SortKeyCache<V> for RocksSortKeyCache<V>
where
    V: Serialize + DeserializeOwned + Send + Sync,
{
    fn get(
        &self,
        contract: &TxId,
        sort_key: &SortKey,
    ) -> Result<Option<CacheEntry<V>>, CacheError> {
        let db = self.db.read();
        match db.get(storage_key(contract, sort_key))? {
            Some(bytes) => Ok(Some(self.decode(sort_key.clone(), &bytes)?)),
            None => Ok(None),
        }
    }

    fn get_last(&self, contract: &TxId) -> Result<Option<CacheEntry<V>>, CacheError> {
        let db = self.db.read();
        self.seek_at_most(&db, contract, &contract_upper_bound(contract))
    }

    fn get_less_or_equal(
        &self,
        contract: &TxId,
        sort_key: &SortKey,
    ) -> Result<Option<CacheEntry<V>>, CacheError> {
        let db = self.db.read();
        self.seek_at_most(&db, contract, &storage_key(contract, sort_key))
    }

    fn put(&self, contract: &TxId, sort_key: SortKey, value: V) -> Result<(), CacheError> {
        let bytes = weft_types::codec::canonical_json(&value)
            .map_err(|e| CacheError::Codec(e.to_string()))?;
        let db = self.db.write();
        db.put_opt(
            storage_key(contract, &sort_key),
            bytes.as_bytes(),
            &self.write_opts(),
        )?;
        Ok(())
    }

    fn delete_contract(&self, contract: &TxId) -> Result<(), CacheError> {
        let db = self.db.write();
        let prefix = contract_prefix(contract);
        let mut batch = WriteBatch::default();
        for entry in db.iterator(IteratorMode::From(&prefix, Direction::Forward)) {
            let (key, _) = entry?;
            if !key.starts_with(&prefix) {
                break;
            }
            batch.delete(key);
        }
        db.write_opt(batch, &self.write_opts())?;
        Ok(())
    }

    fn keys(&self) -> Result<Vec<(TxId, SortKey)>, CacheError> {
        let db = self.db.read();
        let mut out = Vec::new();
        for entry in db.iterator(IteratorMode::Start) {
            let (key, _) = entry?;
            out.push(parse_key(&key)?);
        }
        Ok(out)
    }

    fn all_contracts(&self) -> Result<Vec<TxId>, CacheError> {
        let mut contracts: Vec<TxId> = Vec::new();
        for (contract, _) in self.keys()? {
            if contracts.last() != Some(&contract) {
                contracts.push(contract);
            }
        }
        Ok(contracts)
    }

    fn dump(&self) -> Result<Vec<(TxId, SortKey, V)>, CacheError> {
        let db = self.db.read();
        let mut out = Vec::new();
        for entry in db.iterator(IteratorMode::Start) {
            let (key, value) = entry?;
            let (contract, sort_key) = parse_key(&key)?;
            out.push((contract, sort_key, serde_json::from_slice(&value)?));
        }
        Ok(out)
    }

    fn prune(&self, retain: usize) -> Result<usize, CacheError> {
        let db = self.db.write();
        let mut batch = WriteBatch::default();
        let mut removed = 0;

        let mut current: Option<(TxId, Vec<Vec<u8>>)> = None;
        let flush = |group: Option<(TxId, Vec<Vec<u8>>)>,
                         batch: &mut WriteBatch,
                         removed: &mut usize| {
            if let Some((_, keys)) = group {
                // keys arrive in ascending sort-key order; drop the oldest
                let excess = keys.len().saturating_sub(retain);
                for key in keys.into_iter().take(excess) {
                    batch.delete(key);
                    *removed += 1;
                }
            }
        };

        for entry in db.iterator(IteratorMode::Start) {
            let (key, _) = entry?;
            let (contract, _) = parse_key(&key)?;
            match &mut current {
                Some((active, keys)) if *active == contract => keys.push(key.to_vec()),
                _ => {
                    flush(current.take(), &mut batch, &mut removed);
                    current = Some((contract, vec![key.to_vec()]));
                }
            }
        }
        flush(current, &mut batch, &mut removed);

        db.write_opt(batch, &self.write_opts())?;
        debug!(removed, retain, "pruned sort-key cache");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value as JsonValue};
    use weft_types::BlockRef;

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

    fn open_temp() -> (tempfile::TempDir, RocksSortKeyCache<JsonValue>) {
        let dir = tempfile::tempdir().unwrap();
        let cache = RocksSortKeyCache::open(RocksCacheConfig::for_testing(
            dir.path().to_string_lossy().to_string(),
        ))
        .unwrap();
        (dir, cache)
    }

    #[test]
    fn test_put_get_roundtrip() {
        let (_dir, cache) = open_temp();
        let c = TxId::from("contract-a");
        let k = key(100, "tx");

        cache.put(&c, k.clone(), json!({"counter": 1})).unwrap();
        let entry = cache.get(&c, &k).unwrap().unwrap();
        assert_eq!(entry.value, json!({"counter": 1}));
    }

    #[test]
    fn test_range_lookups_match_memory_semantics() {
        let (_dir, cache) = open_temp();
        let c = TxId::from("contract-a");
        let (k10, k20) = (key(10, "a"), key(20, "b"));

        cache.put(&c, k10.clone(), json!(10)).unwrap();
        cache.put(&c, k20.clone(), json!(20)).unwrap();

        assert_eq!(cache.get_last(&c).unwrap().unwrap().sort_key, k20);
        assert_eq!(
            cache
                .get_less_or_equal(&c, &key(15, "x"))
                .unwrap()
                .unwrap()
                .sort_key,
            k10
        );
        assert_eq!(
            cache.get_less_or_equal(&c, &k20).unwrap().unwrap().value,
            json!(20)
        );
        assert!(cache
            .get_less_or_equal(&c, &SortKey::genesis())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_namespaces_do_not_bleed() {
        let (_dir, cache) = open_temp();
        let a = TxId::from("contract-a");
        // "contract-a!" sorts between "contract-a" prefixed keys if framing broke
        let b = TxId::from("contract-b");

        cache.put(&a, key(10, "i"), json!("a")).unwrap();
        cache.put(&b, key(5, "j"), json!("b")).unwrap();

        assert_eq!(cache.get_last(&a).unwrap().unwrap().value, json!("a"));
        assert_eq!(cache.get_last(&b).unwrap().unwrap().value, json!("b"));
        assert!(cache
            .get_less_or_equal(&b, &key(4, "x"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_delete_contract_and_prune() {
        let (_dir, cache) = open_temp();
        let a = TxId::from("contract-a");
        let b = TxId::from("contract-b");
        for height in 1..=4 {
            cache.put(&a, key(height, "i"), json!(height)).unwrap();
            cache.put(&b, key(height, "i"), json!(height)).unwrap();
        }

        cache.delete_contract(&a).unwrap();
        assert!(cache.get_last(&a).unwrap().is_none());
        assert_eq!(cache.all_contracts().unwrap(), vec![b.clone()]);

        let removed = cache.prune(1).unwrap();
        assert_eq!(removed, 3);
        assert_eq!(cache.get_last(&b).unwrap().unwrap().value, json!(4));
        assert_eq!(cache.keys().unwrap().len(), 1);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_string_lossy().to_string();
        let c = TxId::from("contract-a");
        let k = key(7, "tx");

        {
            let cache: RocksSortKeyCache<JsonValue> =
                RocksSortKeyCache::open(RocksCacheConfig::for_testing(path.clone())).unwrap();
            cache.put(&c, k.clone(), json!({"kept": true})).unwrap();
        }

        let cache: RocksSortKeyCache<JsonValue> =
            RocksSortKeyCache::open(RocksCacheConfig::for_testing(path)).unwrap();
        assert_eq!(
            cache.get(&c, &k).unwrap().unwrap().value,
            json!({"kept": true})
        );
    }
}
