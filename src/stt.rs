// src/stt.rs
//! The state transition table: a sparse `(State, Interface, Message) ->
//! (action, NextState)` trie over caller-provided, statically-sized storage.
//!
//! Grounded in `original_source/StateTransitionTable.c`'s `SetTransition`
//! and `SetNextStates`: elements form a first-child/next-sibling tree
//! (`GetEmptyElement` hands out the next free slot; a parent's children are
//! a linked list reachable from its `child` pointer), and a `link` pass
//! resolves every `next_state` identity recorded during building to either
//! an existing state element or a freshly synthesized "dead" one.
//!
//! Element `0` is reserved as the tree's root anchor (never a real state);
//! real elements start at index `1`, mirroring the original's index-1
//! special case for the root.

use core::fmt;

use crate::error::SttError;
use crate::identity::Identity;

/// An index into a [`TransitionTable`]'s element storage.
pub type ElemIdx = usize;

const ROOT: ElemIdx = 0;

#[derive(Clone, Copy, Debug)]
enum NextStateRef {
    /// Recorded by `set_transition`, before `link` has run.
    Unresolved(Identity),
    /// Rewritten by `link` to point directly at the destination state's
    /// element, existing or synthesized.
    Resolved(ElemIdx),
}

#[derive(Clone, Copy, Debug)]
struct TransitionSlot<A> {
    action: A,
    next_state: NextStateRef,
}

/// One slot of caller-provided table storage.
///
/// Opaque by design: construct an array of [`Element::EMPTY`] and hand it
/// to [`TransitionTable::new`]; nothing else reads or writes the fields
/// directly.
#[derive(Clone, Copy)]
pub struct Element<A> {
    /// The key this node matches: a state, interface or message identity,
    /// depending on the node's depth. `None` marks an unused slot.
    reference: Option<Identity>,
    /// Next node under the same parent.
    sibling: Option<ElemIdx>,
    /// First child, if this node has any (state and interface nodes do;
    /// message/leaf nodes and dead states do not).
    child: Option<ElemIdx>,
    /// Present only on message/leaf nodes.
    transition: Option<TransitionSlot<A>>,
}

impl<A: Copy> Element<A> {
    /// An unused table slot.
    pub const EMPTY: Self = Element { reference: None, sibling: None, child: None, transition: None };
}

impl<A> fmt::Debug for Element<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("reference", &self.reference)
            .field("sibling", &self.sibling)
            .field("child", &self.child)
            .field("has_transition", &self.transition.is_some())
            .finish()
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Phase {
    /// No transitions recorded yet.
    Empty,
    /// At least one transition recorded; `set_transition` still legal.
    Built,
    /// `link` has run; every `next_state` is resolved and `set_transition`
    /// is no longer accepted.
    Linked,
}

/// The resolved result of a table lookup: the action to run, and the
/// identity of the state to transition to.
#[derive(Clone, Copy, Debug)]
pub struct Transition<A> {
    /// The caller-supplied action value recorded by `set_transition`.
    pub action: A,
    /// The destination state's identity.
    pub next_state: Identity,
}

/// A sparse, statically-sized `(State, Interface, Message) -> (action,
/// NextState)` table.
///
/// `A` is whatever the caller uses to represent "the thing that runs when
/// this transition fires" — a function pointer, an enum of handler ids, a
/// closure reference — the table only stores and returns it; invoking it
/// is the dispatcher's job, not this crate's.
pub struct TransitionTable<'a, A: Copy> {
    elements: &'a mut [Element<A>],
    next_free: ElemIdx,
    phase: Phase,
}

impl<A: Copy> fmt::Debug for TransitionTable<'_, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionTable")
            .field("capacity", &self.elements.len())
            .field("next_free", &self.next_free)
            .field("phase", &self.phase)
            .finish()
    }
}

impl<'a, A: Copy> TransitionTable<'a, A> {
    /// Build an empty table over `elements`. `elements[0]` is reserved as
    /// the root anchor; a table therefore has room for `elements.len() - 1`
    /// real nodes (states, interfaces, messages and dead states combined).
    #[must_use]
    pub fn new(elements: &'a mut [Element<A>]) -> Self {
        debug_assert!(!elements.is_empty(), "a transition table needs at least one slot for its root anchor");
        let mut table = Self { elements, next_free: 1, phase: Phase::Empty };
        table.clear();
        table
    }

    /// Re-zero every element and return to `Phase::Empty`, discarding
    /// whatever was built. Legal from any phase, including `Linked` — a
    /// caller may want to rebuild a table over the same storage.
    pub fn clear(&mut self) {
        for e in self.elements.iter_mut() {
            *e = Element::EMPTY;
        }
        self.next_free = 1;
        self.phase = Phase::Empty;
    }

    /// Real nodes allocated so far (states, interfaces, messages and dead
    /// states), excluding the root anchor.
    #[must_use]
    pub fn len(&self) -> usize {
        self.next_free - 1
    }

    /// Whether no transition has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.next_free == 1
    }

    /// Total real-node capacity (excluding the root anchor).
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.elements.len() - 1
    }

    /// Whether [`Self::link`] has run.
    #[must_use]
    pub fn is_linked(&self) -> bool {
        self.phase == Phase::Linked
    }

    /// Reserve `count` contiguous free elements, returning the index of the
    /// first one. The typed/indexed replacement for the original's
    /// `GetEmptyElement`: scans for a run of free consecutive slots large
    /// enough for the request, rather than handing out one slot at a time,
    /// so a freshly-created sub-transition still lands in one contiguous
    /// block exactly as `create_transition` lays it out in the original.
    ///
    /// # Errors
    ///
    /// [`SttError::TableExhausted`] if no contiguous run of `count` free
    /// slots remains — the original asserts here instead.
    fn alloc_run(&mut self, count: usize) -> Result<ElemIdx, SttError> {
        let mut start = 1usize;
        while start + count <= self.elements.len() {
            if self.elements[start..start + count].iter().all(|e| e.reference.is_none()) {
                if start + count > self.next_free {
                    self.next_free = start + count;
                }
                return Ok(start);
            }
            start += 1;
        }
        log::debug!("transition table exhausted: no contiguous run of {count} free slot(s)");
        Err(SttError::TableExhausted)
    }

    fn find_child(&self, first_child: Option<ElemIdx>, key: Identity) -> Option<ElemIdx> {
        let mut cursor = first_child;
        while let Some(idx) = cursor {
            if self.elements[idx].reference == Some(key) {
                return Some(idx);
            }
            cursor = self.elements[idx].sibling;
        }
        None
    }

    /// Append `new_idx` to the end of `parent`'s child chain.
    fn append_child(&mut self, parent: ElemIdx, new_idx: ElemIdx) {
        match self.elements[parent].child {
            None => self.elements[parent].child = Some(new_idx),
            Some(first) => {
                let mut cursor = first;
                while let Some(next) = self.elements[cursor].sibling {
                    cursor = next;
                }
                self.elements[cursor].sibling = Some(new_idx);
            }
        }
    }

    /// Build a leaf (message) element carrying `action`/`next_state`.
    fn leaf(message: Identity, action: A, next_state: Identity) -> Element<A> {
        Element {
            reference: Some(message),
            sibling: None,
            child: None,
            transition: Some(TransitionSlot { action, next_state: NextStateRef::Unresolved(next_state) }),
        }
    }

    /// Record that `(state, interface, message)` fires `action` and leads
    /// to `next_state`. `next_state` need not exist yet: it is resolved (or
    /// synthesized as a dead state) by [`Self::link`].
    ///
    /// Whichever levels of `(state, interface, message)` are missing are
    /// allocated together as a single contiguous run via [`Self::alloc_run`]
    /// — mirroring the original's `create_transition(level, …)`, which
    /// reserves `TRANSITION_SIZE - level` elements in one shot rather than
    /// one slot per level.
    ///
    /// # Errors
    ///
    /// - [`SttError::InvalidState`] if called after [`Self::link`].
    /// - [`SttError::DuplicateTransition`] if this exact triple was already
    ///   recorded; the table is left unchanged.
    /// - [`SttError::TableExhausted`] if no element storage remains for a
    ///   new state, interface or message node.
    pub fn set_transition(
        &mut self,
        state: Identity,
        interface: Identity,
        message: Identity,
        action: A,
        next_state: Identity,
    ) -> Result<(), SttError> {
        if self.phase == Phase::Linked {
            return Err(SttError::InvalidState);
        }

        let state_idx = match self.find_child(self.elements[ROOT].child, state) {
            Some(idx) => idx,
            None => {
                // State, interface and message are all new: one contiguous
                // three-element run.
                let start = self.alloc_run(3)?;
                self.elements[start] =
                    Element { reference: Some(state), sibling: None, child: Some(start + 1), transition: None };
                self.elements[start + 1] =
                    Element { reference: Some(interface), sibling: None, child: Some(start + 2), transition: None };
                self.elements[start + 2] = Self::leaf(message, action, next_state);
                self.append_child(ROOT, start);
                self.phase = Phase::Built;
                return Ok(());
            }
        };

        let iface_idx = match self.find_child(self.elements[state_idx].child, interface) {
            Some(idx) => idx,
            None => {
                // The state exists; interface and message are new: a
                // contiguous two-element run.
                let start = self.alloc_run(2)?;
                self.elements[start] =
                    Element { reference: Some(interface), sibling: None, child: Some(start + 1), transition: None };
                self.elements[start + 1] = Self::leaf(message, action, next_state);
                self.append_child(state_idx, start);
                self.phase = Phase::Built;
                return Ok(());
            }
        };

        if self.find_child(self.elements[iface_idx].child, message).is_some() {
            return Err(SttError::DuplicateTransition);
        }
        let leaf_idx = self.alloc_run(1)?;
        self.elements[leaf_idx] = Self::leaf(message, action, next_state);
        self.append_child(iface_idx, leaf_idx);

        self.phase = Phase::Built;
        Ok(())
    }

    /// Resolve every `next_state` recorded by `set_transition` to a
    /// concrete element: an existing state if one with that identity was
    /// ever used as a transition *source*, or else a freshly synthesized
    /// "dead state" (a childless node that can only ever be a destination).
    ///
    /// Idempotent: calling `link` again after it has already run is a
    /// no-op. After `link`, `set_transition` returns
    /// [`SttError::InvalidState`].
    ///
    /// # Errors
    ///
    /// [`SttError::TableExhausted`] if synthesizing a dead state needs a
    /// slot and none remain.
    pub fn link(&mut self) -> Result<(), SttError> {
        if self.phase == Phase::Linked {
            return Ok(());
        }

        let built = self.next_free;
        let mut cursor = 1;
        while cursor < built {
            if let Some(slot) = self.elements[cursor].transition {
                if let NextStateRef::Unresolved(id) = slot.next_state {
                    let resolved = match self.find_child(self.elements[ROOT].child, id) {
                        Some(idx) => idx,
                        None => {
                            log::debug!("synthesizing dead state for unresolved next-state identity");
                            let new_idx = self.alloc_run(1)?;
                            self.elements[new_idx] =
                                Element { reference: Some(id), sibling: None, child: None, transition: None };
                            self.append_child(ROOT, new_idx);
                            new_idx
                        }
                    };
                    self.elements[cursor].transition =
                        Some(TransitionSlot { action: slot.action, next_state: NextStateRef::Resolved(resolved) });
                }
            }
            cursor += 1;
        }

        self.phase = Phase::Linked;
        Ok(())
    }

    /// Look up the transition for `(state, interface, message)`, if one was
    /// recorded. Works before or after [`Self::link`]: the destination
    /// identity is available either way, resolved or not.
    #[must_use]
    pub fn lookup(&self, state: Identity, interface: Identity, message: Identity) -> Option<Transition<A>> {
        let state_idx = self.find_child(self.elements[ROOT].child, state)?;
        let iface_idx = self.find_child(self.elements[state_idx].child, interface)?;
        let msg_idx = self.find_child(self.elements[iface_idx].child, message)?;
        let slot = self.elements[msg_idx].transition?;
        let next_state = match slot.next_state {
            NextStateRef::Resolved(idx) => {
                self.elements[idx].reference.expect("state nodes always carry their own identity")
            }
            NextStateRef::Unresolved(id) => id,
        };
        Some(Transition { action: slot.action, next_state })
    }

    /// Whether `state` has ever appeared, as a source or as a (possibly
    /// still-unresolved) destination.
    #[must_use]
    pub fn has_state(&self, state: Identity) -> bool {
        self.find_child(self.elements[ROOT].child, state).is_some()
    }
}
