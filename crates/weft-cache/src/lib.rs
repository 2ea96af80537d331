//! # Sort-Key Cache
//!
//! A per-contract key→value store keyed by sort key, with exact, last and
//! `≤` lookups. The evaluator uses it to resume folds from the closest
//! earlier snapshot instead of replaying a contract's whole history.
//!
//! Two adapters share identical semantics: [`MemorySortKeyCache`] for tests
//! and short-lived processes, and [`RocksSortKeyCache`] persisting under a
//! `!<contract>!<sort_key>` key layout whose lexicographic order makes
//! range scans cheap.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod adapters;
pub mod errors;
pub mod ports;

pub use adapters::memory::MemorySortKeyCache;
pub use adapters::rocks::{RocksCacheConfig, RocksSortKeyCache};
pub use errors::CacheError;
pub use ports::{CacheEntry, SortKeyCache};
