//! # Runtime event subscribers.
//!
//! Subscribers observe the runtime [`Event`](crate::events::Event) stream
//! (task lifecycle, filter changes, reassembly progress, service status).
//! They are an observability side channel: application listeners never depend
//! on them.
//!
//! ## Architecture
//! ```text
//! TaskQueue / Dispatcher / Reassembler / ServiceCore
//!        │ publish(Event)
//!        ▼
//!       Bus ──► Runtime listener ──► SubscriberSet::emit()
//!                                        │
//!                                        ├──► [queue] ──► worker ──► LogWriter
//!                                        └──► [queue] ──► worker ──► Custom ...
//! ```
//!
//! ## Implementing custom subscribers
//! ```no_run
//! use simstub::{Event, EventKind, Subscribe};
//! use async_trait::async_trait;
//!
//! struct FilterAudit;
//!
//! #[async_trait]
//! impl Subscribe for FilterAudit {
//!     async fn on_event(&self, event: &Event) {
//!         if event.kind == EventKind::FilterActivated {
//!             // record event.filter
//!         }
//!     }
//!     fn name(&self) -> &'static str { "filter-audit" }
//! }
//! ```

#[cfg(feature = "logging")]
mod log;
mod subscribe;
mod subscriber_set;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use subscribe::Subscribe;
pub use subscriber_set::SubscriberSet;
