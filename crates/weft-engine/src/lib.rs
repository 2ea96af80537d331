//! # Weft Engine
//!
//! The state evaluation core: a deterministic, cache-assisted fold of a
//! contract's interaction stream through a sandboxed handler, with
//! re-entrant cross-contract reads and writes, transactional staging of
//! inter-contract effects, and confirmation-aware persistence.
//!
//! ## Shape
//!
//! - `ports::inbound` — the [`ContractApi`](ports::inbound::ContractApi)
//!   facade users call.
//! - `ports::outbound` — what the engine consumes: the handler sandbox
//!   boundary, sandbox providers, the write transport and the optional
//!   verifier capabilities.
//! - `domain` — pure machinery: the call stack and its cycle excision,
//!   the copy-on-write interaction scratchpad, interaction classification
//!   and the evolve modifier.
//! - `evaluator` — the fold itself, base and cacheable variants.
//! - `service` — the [`Engine`](service::Engine) wiring and the
//!   [`Contract`](service::Contract) facade.
//!
//! Control flow is re-entrant by design: during `handle` a guest may ask
//! the host to read or write another contract, which re-enters the
//! evaluator for that contract on the same logical task.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod domain;
pub mod events;
pub mod evaluator;
pub mod executor;
pub mod ports;
pub mod service;
pub mod test_utils;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::domain::call_stack::{CallFrame, CallStack};
    pub use crate::domain::interaction_state::InteractionState;
    pub use crate::events::{EngineEvent, EventListener};
    pub use crate::evaluator::{
        BaseStateEvaluator, CacheableStateEvaluator, EvalContext, StateEvaluator,
    };
    pub use crate::executor::{CachingExecutorFactory, ExecutorFactory};
    pub use crate::ports::inbound::ContractApi;
    pub use crate::ports::outbound::{
        ContractBlacklist, HandleContext, HandlerApi, HostBridge, InteractionTransport,
        SandboxProvider, SignatureVerifier, VrfVerifier,
    };
    pub use crate::service::{Contract, Engine, EngineConfig, EngineDeps, StateResult};
}
