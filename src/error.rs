// src/error.rs
//! Error taxonomy for the two core subsystems.
//!
//! Hand-rolled `Display` impls rather than `std::error::Error`/`thiserror`:
//! this crate is `no_std`, and neither is available without pulling in std.

use core::fmt;

/// Errors returned by [`crate::message_queue::MessageQueue`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// The producer would lap the consumer: committing this reservation
    /// would leave more bytes occupied than the arena can hold. No state
    /// was mutated.
    Overrun,
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overrun => f.write_str("message queue overrun: producer would lap the reader"),
        }
    }
}

/// Errors returned by [`crate::stt::TransitionTable`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SttError {
    /// No contiguous run of free elements large enough for the request
    /// remains in the table.
    TableExhausted,
    /// `set_transition` was called with a `(state, interface, message)`
    /// triple already present. The table was left unchanged.
    DuplicateTransition,
    /// The operation is not legal in the table's current build phase.
    InvalidState,
}

impl fmt::Display for SttError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TableExhausted => f.write_str("state transition table exhausted"),
            Self::DuplicateTransition => {
                f.write_str("duplicate (state, interface, message) transition")
            }
            Self::InvalidState => f.write_str("operation not legal in the builder's current phase"),
        }
    }
}
