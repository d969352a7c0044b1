//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to runtime events emitted by task queues, listener
//! registries, the dispatcher, the reassembler and the managers.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `TaskQueue`, `ListenerRegistry`, `EventDispatcher`,
//!   `EventPump`, `SegmentReassembler`, `ServiceCore`, `SubscriberSet` workers.
//! - **Consumers**: `Runtime`'s subscriber listener (fans out to `SubscriberSet`).
//!
//! Runtime events are observability only; the notification path towards
//! application listeners never goes through this bus.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};

pub(crate) use event::panic_message;
