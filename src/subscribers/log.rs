//! # LogWriter: renders runtime events through `tracing`.
//!
//! ## Example output
//! ```text
//! INFO  [service] source="sms-0" status=available
//! INFO  [filter-activated] filter="tel_sms"
//! WARN  [unrouted] filter="tel_serving_system_info"
//! INFO  [reassembled] sender="+15550100" segments=3
//! WARN  [source-disconnected] source="event-source" reason="stream ended" delay_ms=100
//! ```

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let source = e.source.as_deref().unwrap_or("unknown");
        let filter = e.filter.as_deref().unwrap_or("unknown");
        let reason = e.reason.as_deref().unwrap_or("");
        match e.kind {
            EventKind::TaskSubmitted => {
                debug!("[submitted] queue={source:?} task={reason:?} delay_ms={:?}", e.delay_ms);
            }
            EventKind::TaskCompleted => {
                debug!("[completed] queue={source:?} task={reason:?}");
            }
            EventKind::TaskSkipped => {
                info!("[skipped] queue={source:?} task={reason:?}");
            }
            EventKind::TaskPanicked => {
                warn!("[task-panicked] queue={source:?} info={reason:?}");
            }
            EventKind::ListenerPanicked => {
                warn!("[listener-panicked] registry={source:?} info={reason:?}");
            }
            EventKind::ListenerPruned => {
                debug!("[pruned] registry={source:?} count={:?}", e.segments);
            }
            EventKind::FilterActivated => {
                info!("[filter-activated] filter={filter:?}");
            }
            EventKind::FilterDeactivated => {
                info!("[filter-deactivated] filter={filter:?}");
            }
            EventKind::EventUnrouted => {
                warn!("[unrouted] filter={filter:?}");
            }
            EventKind::SourceConnected => {
                info!("[source-connected] source={source:?}");
            }
            EventKind::SourceDisconnected => {
                warn!(
                    "[source-disconnected] source={source:?} reason={reason:?} delay_ms={:?}",
                    e.delay_ms
                );
            }
            EventKind::SegmentBuffered => {
                debug!("[buffered] sender={source:?} segments={:?}", e.segments);
            }
            EventKind::MessageReassembled => {
                info!("[reassembled] sender={source:?} segments={:?}", e.segments);
            }
            EventKind::AssemblyEvicted => {
                warn!("[evicted] sender={source:?} segments={:?}", e.segments);
            }
            EventKind::ServiceStatusChanged => {
                let status = e.status.map(|s| s.as_str()).unwrap_or("unknown");
                info!("[service] source={source:?} status={status}");
            }
            EventKind::SubscriberPanicked => {
                warn!("[subscriber-panicked] subscriber={source} info={reason}");
            }
            EventKind::SubscriberOverflow => {
                warn!("[subscriber-overflow] subscriber={source:?} reason={reason:?}");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
