// src/lib.rs
//! A statically-sized, event-driven state-machine core: a wrap-around
//! message queue and a sparse state transition table, intended to sit
//! underneath a caller-supplied dispatcher loop.
//!
//! Both pieces operate entirely over caller-provided storage — a byte
//! arena for [`message_queue::MessageQueue`], an element array for
//! [`stt::TransitionTable`] — and allocate nothing after construction.
//! Neither references the other: a dispatcher ties them together by
//! reading a message out of a queue, looking up the transition it
//! triggers, running the associated action, and routing the result
//! wherever it needs to go (including, for [`timer::TIMER`], back into a
//! queue as a `TimeoutInd`).
//!
//! What this crate does not do: own a clock, run a dispatch loop, invoke
//! transition actions, or talk to any concrete timer hardware. Those are
//! the caller's job; see [`message_queue::Clock`] and [`timer`] for the
//! seams where they plug in.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn, missing_debug_implementations)]
#![warn(missing_docs, unused_must_use)]

#[cfg(test)]
extern crate std;

pub mod error;
pub mod identity;
pub mod message_queue;
pub mod stt;
pub mod timer;

pub use error::{QueueError, SttError};
pub use identity::{Identity, Interface};
pub use message_queue::{Clock, MessageQueue, Tick};
pub use stt::{Element, Transition, TransitionTable};
