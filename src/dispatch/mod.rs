//! # Process-wide routing of inbound events by filter key.
//!
//! ```text
//! EventSource ──► EventPump ──► EventDispatcher.dispatch(key, payload)
//!  (transport     (reconnect      │
//!   stream)        on failure)    ├──► target 1 (subscribed to key)
//!                                 ├──► target 2
//!                                 └──► ...           "all" → every target once
//!
//! subscribe / unsubscribe ──► active key set changed? ──► Upstream::update_filters
//! ```
//!
//! Targets are held weakly; a dropped target is pruned on the next dispatch.
//! Payloads are opaque: each target downcasts to the types it understands and
//! ignores the rest.

mod dispatcher;
mod payload;
mod pump;

pub use dispatcher::{ALL_FILTER, EventDispatcher, EventTarget, FilterKey, NoopUpstream, Upstream};
pub use payload::Payload;
pub use pump::{EventPump, EventSource, InboundStream};
