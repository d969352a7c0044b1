//! # Runtime: shared wiring for every manager of one simulated device.
//!
//! The [`Runtime`] owns the runtime event [`Bus`], the optional
//! [`SubscriberSet`], the [`EventDispatcher`] that routes inbound transport
//! events, and the root [`CancellationToken`]. Managers take a `&Runtime` at
//! construction and derive their own lifetime token from it.
//!
//! ```text
//!                         ┌──────────────── Runtime ────────────────┐
//! EventSource ──► EventPump ──► EventDispatcher ──► SmsManager       │
//!                         │          │         └──► ServingSystemMgr │
//!                         │          └─ Upstream (active filters)    │
//!                         │                                          │
//!   queues / registries ──┼─► Bus ──► listener ──► SubscriberSet     │
//!                         └──────────────────────────────────────────┘
//! ```
//!
//! ## Shutdown path
//! 1. root token cancelled → pumps stop, manager lifetimes end (pending
//!    callbacks are skipped)
//! 2. bus listener drains what is already buffered and exits
//! 3. subscriber queues are closed and their workers drained

mod builder;

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::Config;
use crate::dispatch::{EventDispatcher, EventPump, EventSource};
use crate::events::Bus;
use crate::subscribers::SubscriberSet;

pub use builder::RuntimeBuilder;

/// Shared runtime of a simulated device.
pub struct Runtime {
    cfg: Config,
    bus: Bus,
    subs: Option<Arc<SubscriberSet>>,
    dispatcher: Arc<EventDispatcher>,
    token: CancellationToken,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl Runtime {
    /// Starts building a runtime with the given configuration.
    pub fn builder(cfg: Config) -> RuntimeBuilder {
        RuntimeBuilder::new(cfg)
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Dispatcher shared by every manager of this runtime.
    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    /// Root token; cancelled by [`Runtime::shutdown`].
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Spawns an [`EventPump`] reading `source` until shutdown.
    ///
    /// Must be called within a Tokio runtime.
    pub fn spawn_event_pump(&self, source: Arc<dyn EventSource>) -> JoinHandle<()> {
        let pump = EventPump::new(
            source,
            Arc::clone(&self.dispatcher),
            self.cfg.reconnect,
            self.bus.clone(),
        );
        tokio::spawn(pump.run(self.token.child_token()))
    }

    /// Cancels everything derived from the root token and drains subscribers.
    ///
    /// Idempotent.
    pub async fn shutdown(&self) {
        self.token.cancel();
        let listener = self.listener.lock().take();
        if let Some(handle) = listener {
            let _ = handle.await;
        }
        if let Some(subs) = &self.subs {
            subs.shutdown().await;
        }
        debug!("runtime stopped");
    }

    /// Forwards bus events to the subscriber set until the root token is cancelled.
    fn subscriber_listener(&self) {
        let Some(set) = self.subs.as_ref().map(Arc::clone) else {
            return;
        };
        let mut rx = self.bus.subscribe();
        let token = self.token.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    res = rx.recv() => match res {
                        Ok(ev) => set.emit(&ev),
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "subscriber listener lagged behind the bus");
                        }
                        Err(RecvError::Closed) => return,
                    },
                }
            }
            loop {
                match rx.try_recv() {
                    Ok(ev) => set.emit(&ev),
                    Err(TryRecvError::Lagged(_)) => continue,
                    Err(_) => break,
                }
            }
        });
        *self.listener.lock() = Some(handle);
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Event, EventKind};
    use crate::subscribers::Subscribe;
    use async_trait::async_trait;

    struct Collect(Mutex<Vec<EventKind>>);

    #[async_trait]
    impl Subscribe for Collect {
        async fn on_event(&self, event: &Event) {
            self.0.lock().push(event.kind);
        }
    }

    #[tokio::test]
    async fn subscribers_see_bus_events_published_before_shutdown() {
        let collect = Arc::new(Collect(Mutex::new(Vec::new())));
        let rt = Runtime::builder(Config::default())
            .with_subscribers(vec![collect.clone()])
            .build();

        rt.bus().publish(Event::new(EventKind::SourceConnected));
        rt.bus().publish(Event::new(EventKind::EventUnrouted));
        rt.shutdown().await;

        assert_eq!(
            *collect.0.lock(),
            vec![EventKind::SourceConnected, EventKind::EventUnrouted]
        );
        assert!(rt.token().is_cancelled());
    }

    #[tokio::test]
    async fn shutdown_without_subscribers_is_idempotent() {
        let rt = Runtime::builder(Config::default()).build();
        rt.shutdown().await;
        rt.shutdown().await;
        assert!(rt.token().is_cancelled());
    }
}
