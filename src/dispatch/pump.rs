//! # EventPump: drives the dispatcher from the transport's event stream.
//!
//! ```text
//! loop:
//!   connect() ──ok──► SourceConnected ──► read (key, payload) ──► dispatch
//!       │                                      │ stream ended
//!       └─err──────────────┬───────────────────┘
//!                          ▼
//!              SourceDisconnected(delay) ──► sleep(policy.next(attempt)) ──► loop
//! ```
//!
//! The attempt counter resets after every successful connection. The loop
//! exits as soon as the token is cancelled, also while connecting or sleeping.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dispatch::{EventDispatcher, FilterKey, Payload};
use crate::error::StubResult;
use crate::events::{Bus, Event, EventKind};
use crate::policies::ReconnectPolicy;

/// Stream of inbound `(filter key, payload)` pairs.
pub type InboundStream = BoxStream<'static, (FilterKey, Payload)>;

/// Transport-side producer of inbound events.
#[async_trait]
pub trait EventSource: Send + Sync + 'static {
    /// Opens a new event stream. Called again after the previous one ended.
    async fn connect(&self) -> StubResult<InboundStream>;

    /// Human-readable name (for logs/events).
    fn name(&self) -> &'static str {
        "event-source"
    }
}

/// Long-running reader that feeds an [`EventDispatcher`].
pub struct EventPump {
    source: Arc<dyn EventSource>,
    dispatcher: Arc<EventDispatcher>,
    policy: ReconnectPolicy,
    bus: Bus,
}

impl EventPump {
    pub fn new(
        source: Arc<dyn EventSource>,
        dispatcher: Arc<EventDispatcher>,
        policy: ReconnectPolicy,
        bus: Bus,
    ) -> Self {
        Self {
            source,
            dispatcher,
            policy,
            bus,
        }
    }

    /// Runs until `token` is cancelled.
    pub async fn run(self, token: CancellationToken) {
        let name = self.source.name();
        let mut attempt: u32 = 0;

        loop {
            let connected = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                res = self.source.connect() => res,
            };

            let reason = match connected {
                Ok(mut stream) => {
                    attempt = 0;
                    info!(source = name, "event source connected");
                    self.bus
                        .publish(Event::new(EventKind::SourceConnected).with_source(name));

                    loop {
                        tokio::select! {
                            biased;
                            _ = token.cancelled() => return,
                            next = stream.next() => match next {
                                Some((key, payload)) => {
                                    self.dispatcher.dispatch(&key, &payload);
                                }
                                None => break,
                            }
                        }
                    }
                    "stream ended".to_string()
                }
                Err(e) => e.as_message(),
            };

            let delay = self.policy.next(attempt);
            attempt = attempt.saturating_add(1);
            warn!(source = name, reason = %reason, ?delay, "event source disconnected");
            self.bus.publish(
                Event::new(EventKind::SourceDisconnected)
                    .with_source(name)
                    .with_reason(reason)
                    .with_delay(delay),
            );

            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        debug!(source = name, "event pump stopped");
    }
}
