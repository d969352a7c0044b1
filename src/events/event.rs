//! # Runtime events emitted by queues, registries, the dispatcher and managers.
//!
//! The [`EventKind`] enum classifies event types across five categories:
//! - **Task events**: deferred completion lifecycle in a [`TaskQueue`](crate::TaskQueue)
//! - **Listener events**: fanout isolation and lazy pruning
//! - **Dispatch events**: filter activation and routing
//! - **Reassembly events**: multi-part message progress
//! - **Service / subscriber events**: manager state and subscriber health
//!
//! The [`Event`] struct carries additional metadata such as timestamps, source
//! name, filter key, reasons and delays.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use simstub::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::TaskSubmitted)
//!     .with_source("sms-0")
//!     .with_reason("send_sms")
//!     .with_delay(Duration::from_millis(100));
//!
//! assert_eq!(ev.kind, EventKind::TaskSubmitted);
//! assert_eq!(ev.source.as_deref(), Some("sms-0"));
//! assert_eq!(ev.delay_ms, Some(100));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::manager::ServiceStatus;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Task events ===
    /// Task accepted by a queue.
    ///
    /// Sets:
    /// - `source`: queue name
    /// - `reason`: task name
    /// - `delay_ms`: artificial delay before the task body runs
    TaskSubmitted,

    /// Task body ran to completion.
    ///
    /// Sets:
    /// - `source`: queue name
    /// - `reason`: task name
    TaskCompleted,

    /// Task owner was gone when the task came due; the body was skipped.
    ///
    /// Sets:
    /// - `source`: queue name
    /// - `reason`: task name
    TaskSkipped,

    /// Task body panicked; the panic was contained.
    ///
    /// Sets:
    /// - `source`: queue name
    /// - `reason`: panic message
    TaskPanicked,

    // === Listener events ===
    /// A listener callback panicked during fanout; remaining listeners were still invoked.
    ///
    /// Sets:
    /// - `source`: registry name
    /// - `reason`: panic message
    ListenerPanicked,

    /// Dead (dropped) listeners were removed during fanout or deregistration.
    ///
    /// Sets:
    /// - `source`: registry name
    /// - `segments`: number of pruned entries
    ListenerPruned,

    // === Dispatch events ===
    /// First target subscribed to a filter key.
    ///
    /// Sets:
    /// - `filter`: filter key
    FilterActivated,

    /// Last target unsubscribed from a filter key.
    ///
    /// Sets:
    /// - `filter`: filter key
    FilterDeactivated,

    /// An inbound event arrived for a filter key nobody subscribed to.
    ///
    /// Sets:
    /// - `filter`: filter key
    EventUnrouted,

    /// Event source connected (stream established).
    SourceConnected,

    /// Event source failed to connect or its stream ended.
    ///
    /// Sets:
    /// - `reason`: error text, if any
    /// - `delay_ms`: delay before the next connection attempt
    SourceDisconnected,

    // === Reassembly events ===
    /// A segment was stored, the message is still incomplete.
    ///
    /// Sets:
    /// - `source`: sender address
    /// - `segments`: distinct segments held so far
    SegmentBuffered,

    /// All segments of a message are present.
    ///
    /// Sets:
    /// - `source`: sender address
    /// - `segments`: total number of segments
    MessageReassembled,

    /// A stale partial message was dropped by the TTL policy.
    ///
    /// Sets:
    /// - `source`: sender address
    /// - `segments`: segments held at eviction time
    AssemblyEvicted,

    // === Service events ===
    /// Manager service status changed.
    ///
    /// Sets:
    /// - `source`: manager name
    /// - `status`: new status
    ServiceStatusChanged,

    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `source`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `source`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Emitting component (queue, registry, manager, subscriber or sender address).
    pub source: Option<Arc<str>>,
    /// Filter key, for dispatch events.
    pub filter: Option<Arc<str>>,
    /// Human-readable reason (task name, panic message, error text).
    pub reason: Option<Arc<str>>,
    /// Delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Segment or entry count.
    pub segments: Option<u32>,
    /// Service status, for [`EventKind::ServiceStatusChanged`].
    pub status: Option<ServiceStatus>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            source: None,
            filter: None,
            reason: None,
            delay_ms: None,
            segments: None,
            status: None,
        }
    }

    /// Attaches the emitting component name.
    #[inline]
    pub fn with_source(mut self, source: impl Into<Arc<str>>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Attaches a filter key.
    #[inline]
    pub fn with_filter(mut self, filter: impl Into<Arc<str>>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Attaches a segment / entry count.
    #[inline]
    pub fn with_segments(mut self, n: u32) -> Self {
        self.segments = Some(n);
        self
    }

    /// Attaches a service status.
    #[inline]
    pub fn with_status(mut self, status: ServiceStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_source(subscriber)
            .with_reason(reason)
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_source(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }
}

/// Extracts a printable message from a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
