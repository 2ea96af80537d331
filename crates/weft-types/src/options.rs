//! # Evaluation Options
//!
//! Knobs governing one evaluation: failure tolerance, internal writes, call
//! depth, timeouts, sandbox determinism constraints and cache cadence. A
//! contract may pin options through its manifest; the engine refuses to
//! evaluate with a root configuration weaker than what the manifest demands.

use crate::codec::SerializationFormat;
use crate::errors::EvaluationError;
use crate::eval::TxId;
use serde::{Deserialize, Serialize};

/// Policy for interactions whose source references a non-deterministic
/// ("unsafe") client API.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnsafeClientPolicy {
    /// Log and evaluate anyway.
    Allow,
    /// Mark the interaction invalid and halt further progress.
    Skip,
    /// Abort the whole evaluation.
    Throw,
}

/// Options for dry-run stack trace capture.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackTraceOptions {
    /// Record the intermediate state after every interaction of a dry run.
    #[serde(default)]
    pub save_state: bool,
}

/// Per-evaluation configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EvaluationOptions {
    /// Treat handler exceptions as invalid interactions instead of
    /// aborting the fold.
    pub ignore_exceptions: bool,
    /// Flush the scratchpad to cache after every interaction.
    pub update_cache_for_each_interaction: bool,
    /// Evaluate internal writes; without this they are skipped as noise.
    pub internal_writes: bool,
    /// Maximum depth of the cross-contract call chain.
    pub max_call_depth: u32,
    /// Wall-clock budget for a single `handle` call, in seconds.
    pub max_interaction_evaluation_time_seconds: u64,
    /// Policy for sources referencing the unsafe client.
    pub unsafe_client: UnsafeClientPolicy,
    /// Permit `BigInt` usage in JS sources.
    pub allow_big_int: bool,
    /// Additionally flush the scratchpad every N interactions; negative
    /// disables the cadence.
    pub cache_every_n_interactions: i64,
    /// Accepted source transaction ids; empty means any source.
    pub whitelist_sources: Vec<TxId>,
    /// Guest↔host bridge encoding for WASM contracts.
    pub wasm_serialization_format: SerializationFormat,
    /// Run the `__init` constructor before the first interaction.
    pub use_constructor: bool,
    /// Expose the sort-key scoped KV sub-store to the guest.
    pub use_kv_storage: bool,
    /// Dry-run stack trace capture.
    pub stack_trace: StackTraceOptions,
}

impl Default for EvaluationOptions {
    fn default() -> Self {
        Self {
            ignore_exceptions: true,
            update_cache_for_each_interaction: false,
            internal_writes: false,
            max_call_depth: 7,
            max_interaction_evaluation_time_seconds: 60,
            unsafe_client: UnsafeClientPolicy::Throw,
            allow_big_int: false,
            cache_every_n_interactions: -1,
            whitelist_sources: Vec::new(),
            wasm_serialization_format: SerializationFormat::Json,
            use_constructor: false,
            use_kv_storage: false,
            stack_trace: StackTraceOptions::default(),
        }
    }
}

impl EvaluationOptions {
    /// Verifies these (root) options are at least as strict as the options
    /// a contract pinned in its manifest.
    ///
    /// A root configuration may tighten a manifest but never loosen it:
    /// e.g. a manifest demanding `internal_writes` support fails against a
    /// root that disabled them, and a manifest forbidding the unsafe
    /// client fails against a root that allows it.
    pub fn check_manifest(&self, manifest: &EvaluationOptions) -> Result<(), EvaluationError> {
        let mut conflicts = Vec::new();

        if manifest.internal_writes && !self.internal_writes {
            conflicts.push("internalWrites");
        }
        if !manifest.ignore_exceptions && self.ignore_exceptions {
            conflicts.push("ignoreExceptions");
        }
        if manifest.use_constructor && !self.use_constructor {
            conflicts.push("useConstructor");
        }
        if manifest.use_kv_storage && !self.use_kv_storage {
            conflicts.push("useKVStorage");
        }
        if manifest.allow_big_int && !self.allow_big_int {
            conflicts.push("allowBigInt");
        }
        if manifest.unsafe_client == UnsafeClientPolicy::Throw
            && self.unsafe_client != UnsafeClientPolicy::Throw
        {
            conflicts.push("unsafeClient");
        }

        if conflicts.is_empty() {
            Ok(())
        } else {
            Err(EvaluationError::Protocol(format!(
                "evaluation options incompatible with contract manifest: {}",
                conflicts.join(", ")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_protocol() {
        let opts = EvaluationOptions::default();
        assert!(opts.ignore_exceptions);
        assert!(!opts.internal_writes);
        assert_eq!(opts.max_call_depth, 7);
        assert_eq!(opts.max_interaction_evaluation_time_seconds, 60);
        assert_eq!(opts.unsafe_client, UnsafeClientPolicy::Throw);
        assert_eq!(opts.cache_every_n_interactions, -1);
        assert_eq!(opts.wasm_serialization_format, SerializationFormat::Json);
    }

    #[test]
    fn test_manifest_may_not_be_loosened() {
        let root = EvaluationOptions::default();
        let manifest = EvaluationOptions {
            internal_writes: true,
            ..EvaluationOptions::default()
        };
        let err = root.check_manifest(&manifest).unwrap_err();
        assert!(err.to_string().contains("internalWrites"));
    }

    #[test]
    fn test_matching_manifest_passes() {
        let root = EvaluationOptions {
            internal_writes: true,
            use_kv_storage: true,
            ..EvaluationOptions::default()
        };
        let manifest = EvaluationOptions {
            internal_writes: true,
            ..EvaluationOptions::default()
        };
        assert!(root.check_manifest(&manifest).is_ok());
    }

    #[test]
    fn test_options_deserialize_from_camel_case() {
        let opts: EvaluationOptions = serde_json::from_str(
            r#"{"internalWrites": true, "maxCallDepth": 3, "unsafeClient": "skip"}"#,
        )
        .unwrap();
        assert!(opts.internal_writes);
        assert_eq!(opts.max_call_depth, 3);
        assert_eq!(opts.unsafe_client, UnsafeClientPolicy::Skip);
        // untouched fields keep their defaults
        assert!(opts.ignore_exceptions);
    }
}
