//! # Integration Tests Crate
//!
//! Cross-crate tests driving the whole pipeline — loaders → sorter →
//! evaluator → executor → cache — through the public facade, with native
//! in-process handlers standing in for sandbox plugins.
//!
//! ## Structure
//!
//! ```text
//! integration-tests/
//! ├── src/
//! │   ├── lib.rs        # This file
//! │   ├── harness.rs    # Engine test bed + native contracts + mini HTTP server
//! │   ├── scenarios.rs  # End-to-end scenarios (reads, writes, evolve, failures)
//! │   └── properties.rs # Determinism, cache and ordering invariants
//! ```
//!
//! ## Scenario Coverage
//!
//! 1. **Empty history**: genesis state, second read is a cache hit
//! 2. **Token transfer**: balances move, validity recorded
//! 3. **Known error**: a contract rejection never aborts the fold
//! 4. **Internal write cycle**: `A` writes `B` writes `A`, converging
//! 5. **Evolve**: handler rebinding mid-fold
//! 6. **Network failure**: gateway errors surface with their status

pub mod harness;
pub mod properties;
pub mod scenarios;
