//! # Per-manager listener subscriptions.
//!
//! [`ListenerRegistry`] holds the observers of one manager subsystem. Listeners
//! are kept as [`Weak`](std::sync::Weak) references: the registry never extends
//! a listener's life, and a listener that has been dropped is pruned the next
//! time the registry walks over it.
//!
//! Two subscription styles live side by side:
//! - **plain**: `register` / `deregister`, delivered with `broadcast`
//! - **masked**: `register_mask` / `deregister_mask`, partitioned by the bits of a
//!   [`bitflags`] notification mask and delivered with `fanout`
//!
//! Masked calls report activation edges so the owner can (un)subscribe the
//! matching upstream filter keys:
//!
//! ```text
//! register_mask(A, {X,Y})   X: 0→1  Y: 0→1   first_activated = {X,Y}
//! register_mask(B, {X})     X: 1→2           first_activated = {}
//! deregister_mask(A, {X,Y}) X: 2→1  Y: 1→0   last_deactivated = {Y}
//! ```

mod registry;

pub use registry::{ListenerRegistry, Registration};

bitflags::bitflags! {
    /// Mask type of registries that only use plain subscriptions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Unmasked: u32 {}
}
