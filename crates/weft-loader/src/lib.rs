//! # Loaders
//!
//! Everything that pulls contract data off the network: interaction
//! loaders (remote gateway, native GQL, and a memoizing wrapper) and the
//! definition loader resolving a contract id to its (source, initial
//! state, metadata) triple.
//!
//! Loads are all-or-nothing: a failed page aborts the whole load with a
//! network error rather than returning a partial history, because a
//! partial history would fold to a wrong state.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod adapters;
pub mod errors;
pub mod ports;

pub use adapters::caching::{CachingDefinitionLoader, CachingInteractionLoader};
pub use adapters::definition::ContractDefinitionLoader;
pub use adapters::gateway::{ConfirmationFilter, GatewayInteractionLoader, SourceFilter};
pub use adapters::gql::GqlInteractionLoader;
pub use errors::LoaderError;
pub use ports::{DefinitionLoader, InteractionLoader, NetworkTransaction, TransactionSource};
