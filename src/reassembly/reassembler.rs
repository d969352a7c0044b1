//! # SegmentReassembler: keyed aggregation of ordered multi-part messages.
//!
//! ## Rules
//! - The declared total is taken from the first segment seen for a key. A later
//!   segment declaring another total, or an index beyond it, is dropped.
//! - A segment whose index is already held replaces it (last write wins).
//! - Completion removes the assembly, so a late duplicate starts a new one.
//! - `total == 1` never touches the map.
//! - Segment info is **not** validated here; callers run [`SegmentInfo::validate`] first.
//! - Partial messages are kept until complete unless the owner calls
//!   [`SegmentReassembler::evict_expired`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::events::{Bus, Event, EventKind};
use crate::reassembly::{MessageKey, SegmentInfo};

/// Result of feeding one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reassembly<P> {
    /// More segments are needed.
    Incomplete,
    /// Every segment is present; payloads in index order.
    Complete(Vec<P>),
}

impl<P> Reassembly<P> {
    pub fn is_complete(&self) -> bool {
        matches!(self, Reassembly::Complete(_))
    }
}

struct Assembly<P> {
    total: u32,
    segments: BTreeMap<u32, P>,
    created: Instant,
}

/// Thread-safe reassembly table.
pub struct SegmentReassembler<P> {
    pending: Mutex<HashMap<MessageKey, Assembly<P>>>,
    bus: Bus,
}

impl<P> SegmentReassembler<P> {
    pub fn new(bus: Bus) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            bus,
        }
    }

    /// Feeds one segment from `sender`.
    pub fn ingest(&self, sender: &str, info: SegmentInfo, payload: P) -> Reassembly<P> {
        if info.is_single() {
            return Reassembly::Complete(vec![payload]);
        }

        let key = MessageKey::new(sender, info.reference);
        let mut pending = self.pending.lock();
        let assembly = pending.entry(key.clone()).or_insert_with(|| Assembly {
            total: info.total,
            segments: BTreeMap::new(),
            created: Instant::now(),
        });
        if info.total != assembly.total || info.index > assembly.total {
            let declared = assembly.total;
            drop(pending);
            warn!(
                sender,
                reference = info.reference,
                total = info.total,
                index = info.index,
                declared,
                "segment disagrees with the declared total, dropped"
            );
            return Reassembly::Incomplete;
        }
        if assembly.segments.insert(info.index, payload).is_some() {
            trace!(sender, reference = info.reference, index = info.index, "duplicate segment replaced");
        }

        let held = u32::try_from(assembly.segments.len()).unwrap_or(u32::MAX);
        if held < assembly.total {
            drop(pending);
            self.bus.publish(
                Event::new(EventKind::SegmentBuffered)
                    .with_source(key.sender)
                    .with_segments(held),
            );
            return Reassembly::Incomplete;
        }

        let Some(done) = pending.remove(&key) else {
            return Reassembly::Incomplete;
        };
        drop(pending);

        debug!(sender, reference = info.reference, total = done.total, "message reassembled");
        self.bus.publish(
            Event::new(EventKind::MessageReassembled)
                .with_source(key.sender)
                .with_segments(done.total),
        );
        Reassembly::Complete(done.segments.into_values().collect())
    }

    /// Drops assemblies older than `ttl`. Returns how many were dropped.
    pub fn evict_expired(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let mut evicted: Vec<(MessageKey, u32)> = Vec::new();
        self.pending.lock().retain(|key, a| {
            let keep = now.saturating_duration_since(a.created) < ttl;
            if !keep {
                evicted.push((key.clone(), u32::try_from(a.segments.len()).unwrap_or(u32::MAX)));
            }
            keep
        });

        for (key, held) in &evicted {
            debug!(sender = %key.sender, reference = key.reference, held, "stale partial message evicted");
            self.bus.publish(
                Event::new(EventKind::AssemblyEvicted)
                    .with_source(Arc::clone(&key.sender))
                    .with_segments(*held),
            );
        }
        evicted.len()
    }

    /// Number of messages waiting for more segments.
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }
}
