use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::dispatch::{EventDispatcher, Upstream};
use crate::events::Bus;
use crate::subscribers::{Subscribe, SubscriberSet};

use super::Runtime;

/// Builder for a [`Runtime`].
pub struct RuntimeBuilder {
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
    upstream: Option<Arc<dyn Upstream>>,
}

impl RuntimeBuilder {
    pub(super) fn new(cfg: Config) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            upstream: None,
        }
    }

    /// Sets runtime event subscribers.
    ///
    /// Subscribers receive queue, dispatch, reassembly and service events
    /// through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Sets the sink told about the active filter set after every change.
    pub fn with_upstream(mut self, upstream: Arc<dyn Upstream>) -> Self {
        self.upstream = Some(upstream);
        self
    }

    /// Builds the runtime.
    ///
    /// With subscribers configured this must run inside a Tokio runtime: their
    /// workers and the bus listener are spawned here.
    pub fn build(self) -> Arc<Runtime> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let token = CancellationToken::new();
        let dispatcher = Arc::new(match self.upstream {
            Some(upstream) => EventDispatcher::with_upstream(bus.clone(), upstream),
            None => EventDispatcher::new(bus.clone()),
        });

        let subs = (!self.subscribers.is_empty()).then(|| {
            Arc::new(SubscriberSet::new(
                self.subscribers,
                bus.clone(),
                self.cfg.subscriber_capacity(),
            ))
        });

        let runtime = Arc::new(Runtime {
            cfg: self.cfg,
            bus,
            subs,
            dispatcher,
            token,
            listener: Mutex::new(None),
        });
        runtime.subscriber_listener();
        runtime
    }
}
