//! # ListenerRegistry: weak listeners with per-bit subscription tracking.
//!
//! ## Rules
//! - Listener identity is pointer identity of the shared allocation.
//! - A bit reported in `first_activated` went from zero to one live subscriber;
//!   a bit reported in `last_deactivated` went back to zero.
//! - Expansion of "all notifications" pseudo masks is the caller's job.
//! - Callbacks run **outside** the lock on a snapshot, so a listener may
//!   (de)register itself from inside a callback.
//! - A panicking callback is contained; the remaining listeners still run.
//! - Pruning a dropped listener is a silent 1→0 edge: it is never reported in
//!   `last_deactivated`, so an owner keeps whatever upstream subscription it
//!   made for that bit, and the next registration reports the bit in
//!   `first_activated` again. Deregister explicitly to release upstream state.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};

use bitflags::Flags;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{Status, StubError, StubResult};
use crate::events::{Bus, Event, EventKind, panic_message};
use crate::listeners::Unmasked;

/// Outcome of [`ListenerRegistry::register_mask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration<M> {
    /// `Already` when no new (listener, bit) pair was added.
    pub status: Status,
    /// Bits that gained their first live subscriber with this call.
    pub first_activated: M,
}

struct Subscriptions<L: ?Sized> {
    plain: Vec<Weak<L>>,
    by_bit: BTreeMap<u32, Vec<Weak<L>>>,
}

/// Thread-safe set of weakly held listeners, optionally partitioned by mask bits.
pub struct ListenerRegistry<L: ?Sized, M = Unmasked> {
    name: Arc<str>,
    bus: Bus,
    subs: Mutex<Subscriptions<L>>,
    _mask: PhantomData<fn() -> M>,
}

impl<L, M> ListenerRegistry<L, M>
where
    L: ?Sized + Send + Sync + 'static,
    M: Flags<Bits = u32> + Copy,
{
    /// Creates an empty registry. `name` tags runtime events and logs.
    pub fn new(name: impl Into<Arc<str>>, bus: Bus) -> Self {
        Self {
            name: name.into(),
            bus,
            subs: Mutex::new(Subscriptions {
                plain: Vec::new(),
                by_bit: BTreeMap::new(),
            }),
            _mask: PhantomData,
        }
    }

    /// Adds a plain (mask-less) subscription.
    ///
    /// ### Errors
    /// [`StubError::InvalidParam`] when the listener is already dropped.
    pub fn register(&self, listener: Weak<L>) -> StubResult<Status> {
        if listener.strong_count() == 0 {
            return Err(StubError::invalid("listener is not alive"));
        }
        let mut subs = self.subs.lock();
        let pruned = prune(&mut subs.plain);
        let status = if subs.plain.iter().any(|w| Weak::ptr_eq(w, &listener)) {
            Status::Already
        } else {
            subs.plain.push(listener);
            Status::Success
        };
        drop(subs);

        self.report_pruned(pruned);
        Ok(status)
    }

    /// Removes a plain subscription.
    ///
    /// ### Errors
    /// [`StubError::NoSuch`] when the listener was not registered.
    pub fn deregister(&self, listener: &Weak<L>) -> StubResult<()> {
        let mut subs = self.subs.lock();
        let before = subs.plain.len();
        let mut found = false;
        subs.plain.retain(|w| {
            if Weak::ptr_eq(w, listener) {
                found = true;
                false
            } else {
                w.strong_count() > 0
            }
        });
        let removed = before - subs.plain.len();
        drop(subs);

        let pruned = removed - usize::from(found);
        self.report_pruned(pruned);
        if found { Ok(()) } else { Err(StubError::NoSuch) }
    }

    /// Subscribes `listener` to every bit of `mask`.
    ///
    /// An empty mask stores nothing and returns `Success` with no activated bits.
    ///
    /// ### Errors
    /// [`StubError::InvalidParam`] when the listener is already dropped.
    pub fn register_mask(&self, listener: Weak<L>, mask: M) -> StubResult<Registration<M>> {
        if listener.strong_count() == 0 {
            return Err(StubError::invalid("listener is not alive"));
        }
        let mut first = M::empty();
        if mask.is_empty() {
            return Ok(Registration {
                status: Status::Success,
                first_activated: first,
            });
        }

        let mut added = false;
        let mut pruned = 0;
        let mut subs = self.subs.lock();
        for bit in bits(mask.bits()) {
            let holders = subs.by_bit.entry(bit).or_default();
            pruned += prune(holders);
            if holders.iter().any(|w| Weak::ptr_eq(w, &listener)) {
                continue;
            }
            if holders.is_empty() {
                first.insert(M::from_bits_retain(bit));
            }
            holders.push(Weak::clone(&listener));
            added = true;
        }
        drop(subs);

        self.report_pruned(pruned);
        if !first.is_empty() {
            debug!(registry = %self.name, bits = first.bits(), "notification bits activated");
        }
        Ok(Registration {
            status: if added { Status::Success } else { Status::Already },
            first_activated: first,
        })
    }

    /// Unsubscribes `listener` from every bit of `mask`.
    ///
    /// Returns the bits that no longer have any subscriber.
    ///
    /// ### Errors
    /// - [`StubError::InvalidParam`] for an empty mask (state is left untouched)
    /// - [`StubError::NoSuch`] when the listener held none of the bits
    pub fn deregister_mask(&self, listener: &Weak<L>, mask: M) -> StubResult<M> {
        if mask.is_empty() {
            return Err(StubError::invalid("empty notification mask"));
        }

        let mut last = M::empty();
        let mut found = false;
        let mut pruned = 0;
        let mut subs = self.subs.lock();
        for bit in bits(mask.bits()) {
            let Some(holders) = subs.by_bit.get_mut(&bit) else {
                continue;
            };
            let before = holders.len();
            let mut hit = false;
            holders.retain(|w| {
                if Weak::ptr_eq(w, listener) {
                    hit = true;
                    false
                } else {
                    w.strong_count() > 0
                }
            });
            pruned += before - holders.len() - usize::from(hit);
            if hit {
                found = true;
                if holders.is_empty() {
                    last.insert(M::from_bits_retain(bit));
                }
            }
            if holders.is_empty() {
                subs.by_bit.remove(&bit);
            }
        }
        drop(subs);

        self.report_pruned(pruned);
        if !found {
            return Err(StubError::NoSuch);
        }
        if !last.is_empty() {
            debug!(registry = %self.name, bits = last.bits(), "notification bits deactivated");
        }
        Ok(last)
    }

    /// Delivers to every live listener subscribed to at least one bit of `mask`.
    ///
    /// Each listener is called at most once per call, in bit then registration order.
    pub fn fanout(&self, mask: M, f: impl Fn(&L)) {
        let targets = self.snapshot(mask);
        self.deliver(&targets, f);
    }

    /// Delivers to every live plain listener.
    pub fn broadcast(&self, f: impl Fn(&L)) {
        let targets = self.listeners();
        self.deliver(&targets, f);
    }

    /// Live plain listeners, in registration order.
    pub fn listeners(&self) -> Vec<Arc<L>> {
        let mut subs = self.subs.lock();
        let pruned = prune(&mut subs.plain);
        let live = subs.plain.iter().filter_map(Weak::upgrade).collect();
        drop(subs);
        self.report_pruned(pruned);
        live
    }

    /// Live masked listeners holding at least one bit of `mask`, deduplicated.
    pub fn snapshot(&self, mask: M) -> Vec<Arc<L>> {
        let mut out: Vec<Arc<L>> = Vec::new();
        let mut pruned = 0;
        let mut subs = self.subs.lock();
        for bit in bits(mask.bits()) {
            let Some(holders) = subs.by_bit.get_mut(&bit) else {
                continue;
            };
            pruned += prune(holders);
            for l in holders.iter().filter_map(Weak::upgrade) {
                if !out.iter().any(|o| Arc::ptr_eq(o, &l)) {
                    out.push(l);
                }
            }
        }
        drop(subs);
        self.report_pruned(pruned);
        out
    }

    /// Bits with at least one registered subscriber.
    pub fn active_mask(&self) -> M {
        let subs = self.subs.lock();
        let mut mask = M::empty();
        for (bit, holders) in &subs.by_bit {
            if holders.iter().any(|w| w.strong_count() > 0) {
                mask.insert(M::from_bits_retain(*bit));
            }
        }
        mask
    }

    /// Bits `listener` is currently subscribed to.
    pub fn mask_of(&self, listener: &Weak<L>) -> M {
        let subs = self.subs.lock();
        let mut mask = M::empty();
        for (bit, holders) in &subs.by_bit {
            if holders.iter().any(|w| Weak::ptr_eq(w, listener)) {
                mask.insert(M::from_bits_retain(*bit));
            }
        }
        mask
    }

    /// Returns `true` when `listener` holds a plain subscription or any mask bit.
    pub fn is_subscribed(&self, listener: &Weak<L>) -> bool {
        let subs = self.subs.lock();
        subs.plain.iter().any(|w| Weak::ptr_eq(w, listener))
            || subs
                .by_bit
                .values()
                .any(|holders| holders.iter().any(|w| Weak::ptr_eq(w, listener)))
    }

    /// Number of plain subscriptions (dead ones included until pruned).
    pub fn len(&self) -> usize {
        self.subs.lock().plain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every subscription.
    pub fn clear(&self) {
        let mut subs = self.subs.lock();
        subs.plain.clear();
        subs.by_bit.clear();
    }

    fn deliver(&self, targets: &[Arc<L>], f: impl Fn(&L)) {
        for l in targets {
            if let Err(panic_err) = catch_unwind(AssertUnwindSafe(|| f(l.as_ref()))) {
                let info = panic_message(&*panic_err);
                warn!(registry = %self.name, panic = %info, "listener panicked");
                self.bus.publish(
                    Event::new(EventKind::ListenerPanicked)
                        .with_source(Arc::clone(&self.name))
                        .with_reason(info),
                );
            }
        }
    }

    fn report_pruned(&self, n: usize) {
        if n == 0 {
            return;
        }
        debug!(registry = %self.name, pruned = n, "dead listeners pruned");
        self.bus.publish(
            Event::new(EventKind::ListenerPruned)
                .with_source(Arc::clone(&self.name))
                .with_segments(u32::try_from(n).unwrap_or(u32::MAX)),
        );
    }
}

/// Removes dropped listeners, returns how many were removed.
fn prune<L: ?Sized>(list: &mut Vec<Weak<L>>) -> usize {
    let before = list.len();
    list.retain(|w| w.strong_count() > 0);
    before - list.len()
}

/// Single-bit values set in `raw`, lowest first.
fn bits(raw: u32) -> impl Iterator<Item = u32> {
    (0..u32::BITS)
        .map(|i| 1u32 << i)
        .filter(move |b| raw & b != 0)
}
