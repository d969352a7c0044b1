//! # Non-blocking event fan-out to runtime subscribers.
//!
//! ```text
//! emit(event)
//!     │
//!     ├──► [queue 1] ──► worker 1 ──► subscriber1.on_event()
//!     │    (bounded)         └──────► panic → SubscriberPanicked
//!     └──► [queue N] ──► worker N ──► subscriberN.on_event()
//! ```
//!
//! ## Rules
//! - No ordering across subscribers; each subscriber sees events in order.
//! - `emit()` never blocks (`try_send`); overflow drops the event for that
//!   subscriber only and publishes `SubscriberOverflow`.
//! - Overflow events are never re-reported when they overflow themselves.
//! - A panicking subscriber is reported and keeps receiving events.

use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::events::{Bus, Event, EventKind, panic_message};
use crate::subscribers::Subscribe;

struct SubscriberChannel {
    name: &'static str,
    sender: mpsc::Sender<Arc<Event>>,
}

/// Fan-out coordinator with one queue and worker per subscriber.
pub struct SubscriberSet {
    channels: Mutex<Vec<SubscriberChannel>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    bus: Bus,
}

impl SubscriberSet {
    /// Spawns one worker per subscriber.
    ///
    /// `capacity` overrides every subscriber's [`Subscribe::queue_capacity`].
    /// The effective capacity is at least 1.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus, capacity: Option<usize>) -> Self {
        let mut channels = Vec::with_capacity(subs.len());
        let mut workers = Vec::with_capacity(subs.len());

        for sub in subs {
            let cap = capacity.unwrap_or_else(|| sub.queue_capacity()).max(1);
            let name = sub.name();
            let (tx, mut rx) = mpsc::channel::<Arc<Event>>(cap);
            let worker_bus = bus.clone();

            let handle = tokio::spawn(async move {
                while let Some(ev) = rx.recv().await {
                    let fut = sub.on_event(ev.as_ref());
                    if let Err(panic) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                        let info = panic_message(&*panic);
                        warn!(subscriber = sub.name(), info = %info, "subscriber panicked");
                        worker_bus.publish(Event::subscriber_panicked(sub.name(), info));
                    }
                }
            });
            channels.push(SubscriberChannel { name, sender: tx });
            workers.push(handle);
        }
        Self {
            channels: Mutex::new(channels),
            workers: Mutex::new(workers),
            bus,
        }
    }

    /// Emits an event to all subscribers (clones the event).
    pub fn emit(&self, event: &Event) {
        self.emit_arc(Arc::new(event.clone()));
    }

    /// Emits a shared event to all subscribers.
    pub fn emit_arc(&self, event: Arc<Event>) {
        let is_overflow_evt = event.is_subscriber_overflow();
        let mut dropped: Vec<(&'static str, &'static str)> = Vec::new();

        for channel in self.channels.lock().iter() {
            let reason = match channel.sender.try_send(Arc::clone(&event)) {
                Ok(()) => continue,
                Err(mpsc::error::TrySendError::Full(_)) => "full",
                Err(mpsc::error::TrySendError::Closed(_)) => "closed",
            };
            if !is_overflow_evt {
                dropped.push((channel.name, reason));
            }
        }
        for (name, reason) in dropped {
            self.bus.publish(Event::subscriber_overflow(name, reason));
        }
    }

    /// Number of live subscriber queues.
    pub fn len(&self) -> usize {
        self.channels.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Closes every queue and waits for the workers to drain them.
    ///
    /// Idempotent; later calls return immediately.
    pub async fn shutdown(&self) {
        self.channels.lock().clear();
        let workers = std::mem::take(&mut *self.workers.lock());
        for h in workers {
            let _ = h.await;
        }
    }
}
