//! # EventDispatcher: filter key → targets.
//!
//! ## Rules
//! - `subscribe` is idempotent per (target, key); `Already` when nothing was added.
//! - `unsubscribe` stops at the first key the target does not hold (`NoSuch`);
//!   keys processed before it stay unsubscribed.
//! - `dispatch` never blocks on a target: it snapshots under the lock and
//!   delivers outside of it. A panicking target is contained.
//! - Whenever the set of keys with at least one subscriber changes, the
//!   [`Upstream`] receives the new set. Concurrent changes are delivered in
//!   generation order; a stale set is never pushed after a newer one.

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::dispatch::Payload;
use crate::error::{Status, StubError, StubResult};
use crate::events::{Bus, Event, EventKind, panic_message};

/// Coarse class of inbound event.
pub type FilterKey = Arc<str>;

/// Reserved key: an event dispatched with it reaches every subscribed target.
pub const ALL_FILTER: &str = "all";

const SOURCE: &str = "dispatcher";

/// Receiver of dispatched events (a manager).
pub trait EventTarget: Send + Sync + 'static {
    /// Called once per dispatched event the target is subscribed to.
    ///
    /// Implementations inspect the payload type and ignore what they do not handle.
    fn on_event(&self, key: &str, payload: &Payload);
}

/// Transport side of filter management.
///
/// Receives the complete set of active filter keys every time it changes, so
/// the transport only streams event classes someone listens to.
pub trait Upstream: Send + Sync + 'static {
    fn update_filters(&self, active: &[FilterKey]);
}

/// Upstream that ignores filter changes.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopUpstream;

impl Upstream for NoopUpstream {
    fn update_filters(&self, _active: &[FilterKey]) {}
}

struct Routes {
    by_key: BTreeMap<FilterKey, Vec<Weak<dyn EventTarget>>>,
    generation: u64,
}

impl Routes {
    /// Bumps the generation and returns the active key set to push upstream.
    fn changed(&mut self) -> (u64, Vec<FilterKey>) {
        self.generation += 1;
        (self.generation, self.by_key.keys().cloned().collect())
    }
}

/// Process-wide filter-key multiplexer.
pub struct EventDispatcher {
    routes: Mutex<Routes>,
    upstream: Arc<dyn Upstream>,
    pushed: Mutex<u64>,
    bus: Bus,
}

impl EventDispatcher {
    /// Creates a dispatcher without upstream filter management.
    pub fn new(bus: Bus) -> Self {
        Self::with_upstream(bus, Arc::new(NoopUpstream))
    }

    /// Creates a dispatcher that reports active filter keys to `upstream`.
    pub fn with_upstream(bus: Bus, upstream: Arc<dyn Upstream>) -> Self {
        Self {
            routes: Mutex::new(Routes {
                by_key: BTreeMap::new(),
                generation: 0,
            }),
            upstream,
            pushed: Mutex::new(0),
            bus,
        }
    }

    /// Subscribes `target` to each key.
    ///
    /// ### Errors
    /// [`StubError::InvalidParam`] when the target is already dropped.
    pub fn subscribe(&self, target: Weak<dyn EventTarget>, keys: &[&str]) -> StubResult<Status> {
        if target.strong_count() == 0 {
            return Err(StubError::invalid("dispatch target is not alive"));
        }

        let mut added = false;
        let mut activated: Vec<FilterKey> = Vec::new();
        let mut routes = self.routes.lock();
        for key in keys {
            let list = routes.by_key.entry(Arc::from(*key)).or_default();
            list.retain(|w| w.strong_count() > 0);
            if list.iter().any(|w| Weak::ptr_eq(w, &target)) {
                continue;
            }
            if list.is_empty() {
                activated.push(Arc::from(*key));
            }
            list.push(Weak::clone(&target));
            added = true;
        }
        let update = (!activated.is_empty()).then(|| routes.changed());
        drop(routes);

        for key in activated {
            debug!(filter = %key, "filter activated");
            self.bus
                .publish(Event::new(EventKind::FilterActivated).with_filter(key));
        }
        if let Some((generation, active)) = update {
            self.push_upstream(generation, &active);
        }
        Ok(if added { Status::Success } else { Status::Already })
    }

    /// Unsubscribes `target` from each key, in order.
    ///
    /// ### Errors
    /// [`StubError::NoSuch`] at the first key the target is not subscribed to.
    pub fn unsubscribe(&self, target: &Weak<dyn EventTarget>, keys: &[&str]) -> StubResult<()> {
        let mut result = Ok(());
        let mut deactivated: Vec<FilterKey> = Vec::new();
        let mut routes = self.routes.lock();
        for key in keys {
            let Some(list) = routes.by_key.get_mut(*key) else {
                result = Err(StubError::NoSuch);
                break;
            };
            let before = list.len();
            list.retain(|w| !Weak::ptr_eq(w, target));
            if list.len() == before {
                result = Err(StubError::NoSuch);
                break;
            }
            list.retain(|w| w.strong_count() > 0);
            if list.is_empty() {
                routes.by_key.remove(*key);
                deactivated.push(Arc::from(*key));
            }
        }
        let update = (!deactivated.is_empty()).then(|| routes.changed());
        drop(routes);

        self.after_deactivation(deactivated, update);
        result
    }

    /// Delivers `payload` to every live target subscribed to `key`.
    ///
    /// [`ALL_FILTER`] reaches every subscribed target exactly once. Returns the
    /// number of targets invoked.
    pub fn dispatch(&self, key: &str, payload: &Payload) -> usize {
        let mut targets: Vec<Arc<dyn EventTarget>> = Vec::new();
        let mut deactivated: Vec<FilterKey> = Vec::new();
        let mut routes = self.routes.lock();
        if key == ALL_FILTER {
            for list in routes.by_key.values_mut() {
                list.retain(|w| w.strong_count() > 0);
                for t in list.iter().filter_map(Weak::upgrade) {
                    if !targets.iter().any(|o| Arc::ptr_eq(o, &t)) {
                        targets.push(t);
                    }
                }
            }
            routes.by_key.retain(|k, list| {
                let keep = !list.is_empty();
                if !keep {
                    deactivated.push(Arc::clone(k));
                }
                keep
            });
        } else if let Some(list) = routes.by_key.get_mut(key) {
            list.retain(|w| w.strong_count() > 0);
            targets.extend(list.iter().filter_map(Weak::upgrade));
            if list.is_empty() {
                routes.by_key.remove(key);
                deactivated.push(Arc::from(key));
            }
        }
        let update = (!deactivated.is_empty()).then(|| routes.changed());
        drop(routes);

        self.after_deactivation(deactivated, update);

        if targets.is_empty() {
            trace!(filter = %key, payload = payload.type_name(), "event has no subscriber");
            self.bus
                .publish(Event::new(EventKind::EventUnrouted).with_filter(key));
            return 0;
        }

        for target in &targets {
            if let Err(panic_err) = catch_unwind(AssertUnwindSafe(|| target.on_event(key, payload))) {
                let info = panic_message(&*panic_err);
                warn!(filter = %key, panic = %info, "dispatch target panicked");
                self.bus.publish(
                    Event::new(EventKind::ListenerPanicked)
                        .with_source(SOURCE)
                        .with_filter(key)
                        .with_reason(info),
                );
            }
        }
        targets.len()
    }

    /// Keys with at least one subscriber, sorted.
    pub fn active_filters(&self) -> Vec<FilterKey> {
        self.routes.lock().by_key.keys().cloned().collect()
    }

    /// Number of subscriptions held for `key` (dead targets included until pruned).
    pub fn subscriber_count(&self, key: &str) -> usize {
        self.routes.lock().by_key.get(key).map_or(0, Vec::len)
    }

    /// Returns `true` when `target` is subscribed to `key`.
    pub fn is_subscribed(&self, target: &Weak<dyn EventTarget>, key: &str) -> bool {
        self.routes
            .lock()
            .by_key
            .get(key)
            .is_some_and(|list| list.iter().any(|w| Weak::ptr_eq(w, target)))
    }

    fn after_deactivation(&self, deactivated: Vec<FilterKey>, update: Option<(u64, Vec<FilterKey>)>) {
        for key in deactivated {
            debug!(filter = %key, "filter deactivated");
            self.bus
                .publish(Event::new(EventKind::FilterDeactivated).with_filter(key));
        }
        if let Some((generation, active)) = update {
            self.push_upstream(generation, &active);
        }
    }

    fn push_upstream(&self, generation: u64, active: &[FilterKey]) {
        let mut pushed = self.pushed.lock();
        if generation <= *pushed {
            return;
        }
        *pushed = generation;
        self.upstream.update_filters(active);
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("active_filters", &self.active_filters())
            .finish()
    }
}
