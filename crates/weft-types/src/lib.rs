//! # Weft Shared Types
//!
//! Domain types shared by every crate in the weft workspace: sort keys and
//! their total order, interaction records, contract definitions, evaluation
//! results, evaluation options, the engine error taxonomy, and the canonical
//! state codecs.
//!
//! This crate is intentionally free of I/O: loaders, caches and the
//! evaluator all consume these types but none of them are defined in terms
//! of a transport or a storage backend.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod codec;
pub mod definition;
pub mod errors;
pub mod eval;
pub mod interaction;
pub mod options;
pub mod sort_key;

pub use codec::{canonical_json, SerializationFormat};
pub use definition::{ContractDefinition, ContractType, Source, WasmLang};
pub use errors::{ContractErrorSubtype, EvaluationError};
pub use eval::{
    ContractCall, EvalStateResult, HandlerEvent, InteractionResult, InteractionType, TxId,
};
pub use interaction::{
    tags, BlockRef, ConfirmationStatus, Interaction, InteractionSource, Tag, VrfData,
};
pub use options::{EvaluationOptions, StackTraceOptions, UnsafeClientPolicy};
pub use sort_key::{sort_interactions, SortKey};
