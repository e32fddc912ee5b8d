//! State hierarchy registry and the active-state stack.
//!
//! Registered states form a forest: every entry stores its parent as an
//! arena index, never as an owning pointer. The active stack is a list of
//! entry indices ordered leaf first; for every adjacent pair the second
//! entry is the first one's registered parent.

use crate::error::HsmError;
use crate::state::StateRef;
use std::sync::Arc;

struct StateEntry<C> {
    state: StateRef<C>,
    parent: Option<usize>,
    active: bool,
}

/// Exit/enter work computed for one transition.
///
/// `common` is the nearest active ancestor of the destination, if any; the
/// transition neither exits nor re-enters it. `enter` lists the entries to
/// enter, outermost first, ending with the destination. A destination that
/// is already the active leaf yields `enter: []` with `common` pointing at
/// itself, which makes the transition a no-op.
pub(crate) struct TransitionPlan {
    pub(crate) common: Option<usize>,
    pub(crate) enter: Vec<usize>,
}

pub(crate) struct Hierarchy<C> {
    entries: Vec<StateEntry<C>>,
    stack: Vec<usize>,
}

impl<C> Hierarchy<C> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
            stack: Vec::new(),
        }
    }

    /// Registers `state` under `parent`.
    ///
    /// A parent that was never registered itself is registered first, as a
    /// root. Cycles are not detected; introducing one is a caller bug.
    pub(crate) fn register(
        &mut self,
        state: StateRef<C>,
        parent: Option<&StateRef<C>>,
    ) -> Result<usize, HsmError> {
        if self.index_of(&state).is_some() {
            return Err(HsmError::DuplicateState(state.name()));
        }
        let parent = match parent {
            Some(parent) => Some(match self.index_of(parent) {
                Some(idx) => idx,
                None => self.register(parent.clone(), None)?,
            }),
            None => None,
        };
        self.entries.push(StateEntry {
            state,
            parent,
            active: false,
        });
        Ok(self.entries.len() - 1)
    }

    pub(crate) fn index_of(&self, state: &StateRef<C>) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| Arc::ptr_eq(&entry.state, state))
    }

    pub(crate) fn state(&self, idx: usize) -> StateRef<C> {
        self.entries[idx].state.clone()
    }

    /// Walks the destination's parent chain and splits it at the nearest
    /// active ancestor.
    pub(crate) fn plan(&self, dest: usize) -> TransitionPlan {
        let mut enter = Vec::new();
        let mut common = None;
        let mut cursor = Some(dest);
        while let Some(idx) = cursor {
            if self.entries[idx].active {
                common = Some(idx);
                break;
            }
            enter.push(idx);
            cursor = self.entries[idx].parent;
        }
        enter.reverse();
        TransitionPlan { common, enter }
    }

    pub(crate) fn stack_front(&self) -> Option<usize> {
        self.stack.first().copied()
    }

    /// Pops the current leaf off the stack and clears its active flag.
    pub(crate) fn deactivate_front(&mut self) {
        if !self.stack.is_empty() {
            let idx = self.stack.remove(0);
            self.entries[idx].active = false;
        }
    }

    /// Marks `idx` active and pushes it as the new leaf.
    pub(crate) fn activate(&mut self, idx: usize) {
        self.entries[idx].active = true;
        self.stack.insert(0, idx);
    }

    /// Current leaf state, `None` until the initial transition has pushed one.
    pub(crate) fn leaf(&self) -> Option<StateRef<C>> {
        self.stack_front().map(|idx| self.state(idx))
    }

    /// Snapshot of the active chain, leaf first.
    pub(crate) fn active_states(&self) -> Vec<StateRef<C>> {
        self.stack.iter().map(|&idx| self.state(idx)).collect()
    }

    pub(crate) fn is_active(&self, state: &StateRef<C>) -> bool {
        self.stack
            .iter()
            .any(|&idx| Arc::ptr_eq(&self.entries[idx].state, state))
    }
}
