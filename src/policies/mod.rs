//! Retry policies.
//!
//! Controls **how long** to wait before re-establishing the inbound event
//! stream after a connection attempt fails or the stream ends.
//!
//! ## Contents
//! - [`ReconnectPolicy`] how reconnect delays evolve (first / factor / max + jitter)
//!
//! ## Quick wiring
//! ```text
//! Config { reconnect: ReconnectPolicy, .. }
//!      └─► dispatch::EventPump uses reconnect.next(attempt) between connection attempts
//! ```
//!
//! ## Defaults
//! - `ReconnectPolicy::default()` → first=100ms, factor=1.0 (constant), max=5s, no jitter.

mod reconnect;

pub use reconnect::ReconnectPolicy;
