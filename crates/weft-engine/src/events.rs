//! # Progress Events
//!
//! Observability hooks for long folds: dashboards subscribe a listener
//! and receive progress notifications while `read_state` works through a
//! contract's backlog. No listener means no overhead beyond a branch.

use weft_types::{SortKey, TxId};

/// Events emitted while evaluating.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineEvent {
    /// A fold started with this many interactions to apply.
    EvaluationStarted {
        /// The contract being folded.
        contract: TxId,
        /// Number of missing interactions.
        missing: usize,
    },
    /// Periodic progress, every `progress_notification_frequency`
    /// interactions.
    ProgressNotification {
        /// The contract being folded.
        contract: TxId,
        /// Interactions applied so far.
        current: usize,
        /// Total interactions in this fold.
        all: usize,
    },
    /// One interaction was applied.
    InteractionCompleted {
        /// The contract being folded.
        contract: TxId,
        /// The interaction's id.
        interaction: TxId,
        /// Whether the handler accepted it.
        valid: bool,
    },
    /// The fold finished.
    EvaluationCompleted {
        /// The contract that was folded.
        contract: TxId,
        /// The sort key the state was evaluated at.
        sort_key: SortKey,
    },
}

/// Receives [`EngineEvent`]s. Implementations must be cheap; they run on
/// the evaluation task.
pub trait EventListener: Send + Sync {
    /// Called for every emitted event.
    fn on_event(&self, event: EngineEvent);
}

/// A listener that collects events, for tests and diagnostics.
#[derive(Default)]
pub struct CollectingListener {
    events: parking_lot::Mutex<Vec<EngineEvent>>,
}

impl CollectingListener {
    /// An empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything received so far.
    #[must_use]
    pub fn drain(&self) -> Vec<EngineEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl EventListener for CollectingListener {
    fn on_event(&self, event: EngineEvent) {
        self.events.lock().push(event);
    }
}
