//! # Call Stack
//!
//! The chain of `(contract, interaction)` pairs above the evaluation in
//! progress. Passed by value at each recursion so every nested call owns
//! its own copy; nothing is shared or unwound.
//!
//! Its one non-bookkeeping job is the infinite-loop guard: a write-back
//! cycle (`A` writes `B` writes `A`) re-enters a contract for an
//! interaction already being folded higher up the chain. Excising that
//! interaction (and everything after it) from the nested fold makes the
//! cycle converge.

use weft_types::{Interaction, SortKey, TxId};

/// One frame of the cross-contract call chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallFrame {
    /// Contract whose fold pushed the frame.
    pub contract: TxId,
    /// Interaction being folded when the frame was pushed.
    pub interaction_id: TxId,
    /// Sort key of that interaction.
    pub sort_key: SortKey,
}

/// The call chain, innermost frame last.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallStack {
    frames: Vec<CallFrame>,
}

impl CallStack {
    /// An empty (root) stack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current nesting depth.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// True for the root evaluation.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.frames.is_empty()
    }

    /// Returns a new stack with `frame` appended. The receiver is
    /// untouched; each recursion owns its chain.
    #[must_use]
    pub fn push(&self, frame: CallFrame) -> Self {
        let mut frames = self.frames.clone();
        frames.push(frame);
        Self { frames }
    }

    /// True when `interaction_id` is already being folded for `contract`
    /// somewhere up the chain.
    #[must_use]
    pub fn contains(&self, contract: &TxId, interaction_id: &TxId) -> bool {
        self.frames
            .iter()
            .any(|f| &f.contract == contract && &f.interaction_id == interaction_id)
    }

    /// The innermost frame, when nested.
    #[must_use]
    pub fn top(&self) -> Option<&CallFrame> {
        self.frames.last()
    }

    /// Applies the infinite-loop guard to a `missing` list for `contract`:
    /// at the first interaction already on the chain for this same
    /// contract, the list is truncated (that interaction excluded).
    #[must_use]
    pub fn excise_cycles(&self, contract: &TxId, missing: Vec<Interaction>) -> Vec<Interaction> {
        match missing
            .iter()
            .position(|i| self.contains(contract, &i.id))
        {
            Some(cut) => missing.into_iter().take(cut).collect(),
            None => missing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_types::BlockRef;

    fn frame(contract: &str, interaction: &str) -> CallFrame {
        CallFrame {
            contract: TxId::from(contract),
            interaction_id: TxId::from(interaction),
            sort_key: SortKey::genesis(),
        }
    }

    fn interaction(id: &str, height: u64) -> Interaction {
        Interaction::test_stub(
            id,
            BlockRef {
                height,
                id: format!("b{height}"),
                timestamp: 1_600_000_000,
            },
        )
    }

    #[test]
    fn test_push_leaves_receiver_untouched() {
        let root = CallStack::new();
        let nested = root.push(frame("a", "i1"));
        assert!(root.is_root());
        assert_eq!(nested.depth(), 1);
        assert_eq!(nested.top().unwrap().contract.as_str(), "a");
    }

    #[test]
    fn test_contains_matches_contract_and_interaction() {
        let stack = CallStack::new().push(frame("a", "i1"));
        assert!(stack.contains(&TxId::from("a"), &TxId::from("i1")));
        assert!(!stack.contains(&TxId::from("b"), &TxId::from("i1")));
        assert!(!stack.contains(&TxId::from("a"), &TxId::from("i2")));
    }

    #[test]
    fn test_excise_truncates_at_first_repeat() {
        let stack = CallStack::new().push(frame("a", "i2"));
        let missing = vec![
            interaction("i1", 1),
            interaction("i2", 2),
            interaction("i3", 3),
        ];
        let guarded = stack.excise_cycles(&TxId::from("a"), missing);
        assert_eq!(guarded.len(), 1);
        assert_eq!(guarded[0].id.as_str(), "i1");
    }

    #[test]
    fn test_excise_is_per_contract() {
        let stack = CallStack::new().push(frame("other", "i2"));
        let missing = vec![interaction("i1", 1), interaction("i2", 2)];
        let untouched = stack.excise_cycles(&TxId::from("a"), missing);
        assert_eq!(untouched.len(), 2);
    }
}
