// src/identity.rs
//! Address-comparable identity handles.
//!
//! The original C implementation compares message ids, states, interfaces
//! and messages by pointer equality, recommending the address of a string
//! literal as the handle. `Identity` is the safe Rust analogue: a `'static`
//! string slice compared by the address (and length) of its backing
//! storage rather than by content, so two string literals with identical
//! text but distinct storage still compare unequal.

use core::fmt;

/// An opaque, address-comparable handle.
///
/// Construct with [`Identity::new`], almost always from a `'static` string
/// literal. The literal's text is available for diagnostics via
/// [`Identity::name`] but carries no semantic meaning of its own.
#[derive(Clone, Copy)]
pub struct Identity(&'static str);

impl Identity {
    /// Wrap a `'static` string literal as an identity handle.
    #[must_use]
    pub const fn new(tag: &'static str) -> Self {
        Identity(tag)
    }

    /// The literal's text, for logging and debugging only.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.0
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        // Pointer equality, not content equality: this is the whole point.
        core::ptr::eq(self.0.as_ptr(), other.0.as_ptr()) && self.0.len() == other.0.len()
    }
}

impl Eq for Identity {}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Identity").field(&self.0).finish()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// A named endpoint on a state machine; messages are delivered to/from
/// interfaces. `remote` is the identity stamped into messages sent on this
/// interface.
#[derive(Clone, Copy, Debug)]
pub struct Interface {
    /// Human-readable name, for diagnostics only.
    pub name: &'static str,
    /// The identity stamped into `interface_tag` when a message is sent
    /// through this interface.
    pub remote: Identity,
}
