//! # ServiceCore: manager state machine and deferred completions.
//!
//! ```text
//! Uninitialized ──init()──► Initializing ──reply Available──► Available
//!       ▲                        │
//!       │                        └──reply other / error─────► Failed ──init()──► Initializing
//! ```
//!
//! ## Rules
//! - Readiness callbacks registered before the state resolves are queued and
//!   replayed exactly once with the resolved status.
//! - Callbacks registered after resolution are scheduled on the [`TaskQueue`],
//!   never run on the caller's stack.
//! - Every completion is guarded by the manager's lifetime token: once the
//!   manager is dropped, pending completions still run but skip the callback.

use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{ErrorCode, Status, StubError, StubResult};
use crate::events::{Bus, Event, EventKind, panic_message};
use crate::manager::{InitReply, ManagerState, Reply, ServiceStatus};
use crate::queue::{Task, TaskQueue};
use crate::runtime::Runtime;

/// Readiness callback.
pub type InitCallback = Box<dyn FnOnce(ServiceStatus) + Send + 'static>;

struct Lifecycle {
    state: ManagerState,
    waiting: Vec<InitCallback>,
    delay: Duration,
}

/// Shared state machine and completion queue of one manager.
pub struct ServiceCore {
    name: Arc<str>,
    phone_id: i32,
    queue: TaskQueue,
    life: Arc<Mutex<Lifecycle>>,
    lifetime: CancellationToken,
    bus: Bus,
}

impl ServiceCore {
    /// Creates an uninitialized core whose lifetime is bounded by the runtime's.
    pub fn new(name: impl Into<Arc<str>>, phone_id: i32, runtime: &Runtime) -> Self {
        let name = name.into();
        Self {
            queue: TaskQueue::new(Arc::clone(&name), runtime.bus().clone()),
            name,
            phone_id,
            life: Arc::new(Mutex::new(Lifecycle {
                state: ManagerState::Uninitialized,
                waiting: Vec::new(),
                delay: runtime.config().callback_delay,
            })),
            lifetime: runtime.token().child_token(),
            bus: runtime.bus().clone(),
        }
    }

    /// Starts initialization with the transport `request`.
    ///
    /// - `Uninitialized` / `Failed`: moves to `Initializing`, returns `Success`
    /// - `Initializing`: queues `callback`, returns `Already`
    /// - `Available`: schedules `callback` right away, returns `Already`
    ///
    /// ### Errors
    /// Submission errors of the [`TaskQueue`].
    pub fn init<F>(&self, request: F, callback: InitCallback) -> StubResult<Status>
    where
        F: Future<Output = StubResult<InitReply>> + Send + 'static,
    {
        let mut life = self.life.lock();
        match life.state {
            ManagerState::Initializing => {
                life.waiting.push(callback);
                return Ok(Status::Already);
            }
            ManagerState::Available => {
                drop(life);
                self.schedule_ready(callback, ServiceStatus::Available)?;
                return Ok(Status::Already);
            }
            ManagerState::Uninitialized | ManagerState::Failed => {}
        }

        let fallback = life.delay;
        self.queue.submit(self.init_task(request, fallback))?;
        life.waiting.push(callback);
        let before = life.state;
        life.state = ManagerState::Initializing;
        drop(life);

        debug!(manager = %self.name, phone_id = self.phone_id, "initialization started");
        if before.service_status() != ServiceStatus::Unavailable {
            publish_status(&self.bus, &self.name, ServiceStatus::Unavailable);
        }
        Ok(Status::Success)
    }

    /// Registers a readiness callback.
    ///
    /// Queued until initialization resolves, scheduled immediately afterwards.
    pub fn on_ready(&self, callback: InitCallback) -> StubResult<()> {
        let mut life = self.life.lock();
        if life.state.is_resolved() {
            let status = life.state.service_status();
            drop(life);
            return self.schedule_ready(callback, status);
        }
        life.waiting.push(callback);
        Ok(())
    }

    /// Fails with [`StubError::NotReady`] unless the service is available.
    pub fn ensure_ready(&self) -> StubResult<()> {
        match self.state() {
            ManagerState::Available => Ok(()),
            _ => Err(StubError::NotReady),
        }
    }

    /// Runs a transport request on the queue and hands its reply to `on_reply`.
    ///
    /// The callback runs after the reply's delay, only when the reply asks for
    /// it and the manager is still alive. A transport error becomes an
    /// [`ErrorCode`] delivered after the default completion delay.
    ///
    /// ### Errors
    /// - [`StubError::NotReady`] unless available
    /// - submission errors of the [`TaskQueue`]
    pub fn request<T, Fut, F>(&self, name: &'static str, call: Fut, on_reply: F) -> StubResult<()>
    where
        T: Default + Send + 'static,
        Fut: Future<Output = StubResult<Reply<T>>> + Send + 'static,
        F: FnOnce(ErrorCode, T) + Send + 'static,
    {
        self.ensure_ready()?;
        let fallback = self.callback_delay();
        let lifetime = self.lifetime.clone();
        let manager = Arc::clone(&self.name);

        let task = Task::new(name, async move {
            let reply = match call.await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(manager = %manager, request = name, error = e.as_label(), "transport request failed");
                    Reply {
                        error: ErrorCode::from(&e),
                        delay: fallback,
                        callback_needed: true,
                        payload: T::default(),
                    }
                }
            };
            if !reply.callback_needed {
                return;
            }
            tokio::time::sleep(reply.delay).await;
            if lifetime.is_cancelled() {
                debug!(manager = %manager, request = name, "manager gone, reply dropped");
                return;
            }
            on_reply(reply.error, reply.payload);
        })
        .guarded_by(self.lifetime.clone());

        self.queue.submit(task)
    }

    pub fn state(&self) -> ManagerState {
        self.life.lock().state
    }

    pub fn service_status(&self) -> ServiceStatus {
        self.state().service_status()
    }

    /// Completion delay currently in effect.
    pub fn callback_delay(&self) -> Duration {
        self.life.lock().delay
    }

    pub fn phone_id(&self) -> i32 {
        self.phone_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Token cancelled when this core is dropped or the runtime shuts down.
    pub fn lifetime(&self) -> &CancellationToken {
        &self.lifetime
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    /// Waits for every pending completion.
    pub async fn shutdown(&self) {
        self.queue.shutdown().await;
    }

    fn schedule_ready(&self, callback: InitCallback, status: ServiceStatus) -> StubResult<()> {
        self.queue.submit(
            Task::from_fn("ready_callback", move || callback(status))
                .guarded_by(self.lifetime.clone()),
        )
    }

    fn init_task<F>(&self, request: F, fallback: Duration) -> Task
    where
        F: Future<Output = StubResult<InitReply>> + Send + 'static,
    {
        let life = Arc::clone(&self.life);
        let lifetime = self.lifetime.clone();
        let bus = self.bus.clone();
        let name = Arc::clone(&self.name);

        Task::new("init", async move {
            let (status, delay) = match request.await {
                Ok(reply) => (reply.status, reply.delay),
                Err(e) => {
                    warn!(manager = %name, error = e.as_label(), "init request failed");
                    (ServiceStatus::Failed, fallback)
                }
            };
            tokio::time::sleep(delay).await;

            let state = match status {
                ServiceStatus::Available => ManagerState::Available,
                ServiceStatus::Unavailable | ServiceStatus::Failed => ManagerState::Failed,
            };
            let resolved = state.service_status();
            let waiting = {
                let mut l = life.lock();
                l.state = state;
                l.delay = delay;
                std::mem::take(&mut l.waiting)
            };
            debug!(manager = %name, status = resolved.as_str(), callbacks = waiting.len(), "initialization resolved");
            publish_status(&bus, &name, resolved);

            for cb in waiting {
                if lifetime.is_cancelled() {
                    break;
                }
                if let Err(panic_err) = catch_unwind(AssertUnwindSafe(|| cb(resolved))) {
                    let info = panic_message(&*panic_err);
                    warn!(manager = %name, panic = %info, "readiness callback panicked");
                    bus.publish(
                        Event::new(EventKind::TaskPanicked)
                            .with_source(Arc::clone(&name))
                            .with_reason(info),
                    );
                }
            }
        })
        .guarded_by(self.lifetime.clone())
    }
}

impl Drop for ServiceCore {
    fn drop(&mut self) {
        self.lifetime.cancel();
    }
}

fn publish_status(bus: &Bus, name: &Arc<str>, status: ServiceStatus) {
    bus.publish(
        Event::new(EventKind::ServiceStatusChanged)
            .with_source(Arc::clone(name))
            .with_status(status),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn runtime() -> Arc<Runtime> {
        Runtime::builder(Config::default()).build()
    }

    fn reply(status: ServiceStatus, ms: u64) -> impl Future<Output = StubResult<InitReply>> + Send + 'static {
        async move {
            Ok(InitReply {
                status,
                delay: Duration::from_millis(ms),
            })
        }
    }

    fn recorder() -> (Arc<Mutex<Vec<ServiceStatus>>>, impl Fn() -> InitCallback) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let make = move || -> InitCallback {
            let s = Arc::clone(&s);
            Box::new(move |status| s.lock().push(status))
        };
        (seen, make)
    }

    #[tokio::test(start_paused = true)]
    async fn callbacks_before_resolution_are_replayed_once() {
        let rt = runtime();
        let core = ServiceCore::new("sms-0", 0, &rt);
        let (seen, cb) = recorder();

        assert_eq!(core.init(reply(ServiceStatus::Available, 100), cb()).unwrap(), Status::Success);
        core.on_ready(cb()).unwrap();
        assert_eq!(core.init(reply(ServiceStatus::Available, 100), cb()).unwrap(), Status::Already);
        assert_eq!(core.state(), ManagerState::Initializing);
        assert!(seen.lock().is_empty());

        core.shutdown().await;
        assert_eq!(*seen.lock(), vec![ServiceStatus::Available; 3]);
        assert_eq!(core.state(), ManagerState::Available);
        assert_eq!(core.callback_delay(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn callbacks_after_resolution_are_scheduled_not_inline() {
        let rt = runtime();
        let core = ServiceCore::new("sms-0", 0, &rt);
        let (seen, cb) = recorder();
        core.init(reply(ServiceStatus::Available, 10), cb()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(seen.lock().len(), 1);

        core.on_ready(cb()).unwrap();
        assert_eq!(seen.lock().len(), 1, "must not run on the caller's stack");
        core.shutdown().await;
        assert_eq!(seen.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_init_reports_failed_and_allows_retry() {
        let rt = runtime();
        let core = ServiceCore::new("ss-0", 0, &rt);
        let (seen, cb) = recorder();

        core.init(async { Err(StubError::failed("server down")) }, cb()).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(core.service_status(), ServiceStatus::Failed);
        assert_eq!(core.ensure_ready().unwrap_err(), StubError::NotReady);

        assert_eq!(core.init(reply(ServiceStatus::Available, 5), cb()).unwrap(), Status::Success);
        core.shutdown().await;
        assert_eq!(*seen.lock(), vec![ServiceStatus::Failed, ServiceStatus::Available]);
    }

    #[tokio::test(start_paused = true)]
    async fn request_requires_availability_and_honours_reply() {
        let rt = runtime();
        let core = ServiceCore::new("sms-0", 0, &rt);
        let err = core
            .request("send", async { Ok(Reply::ok((), Duration::ZERO)) }, |_, ()| {})
            .unwrap_err();
        assert_eq!(err, StubError::NotReady);

        let (_, cb) = recorder();
        core.init(reply(ServiceStatus::Available, 0), cb()).unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;

        let codes = Arc::new(Mutex::new(Vec::new()));
        let c = Arc::clone(&codes);
        core.request(
            "send",
            async { Ok(Reply::ok(7u32, Duration::from_millis(200))) },
            move |code, v| c.lock().push((code, v)),
        )
        .unwrap();
        let silent = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&silent);
        core.request(
            "silent",
            async {
                Ok(Reply {
                    error: ErrorCode::Success,
                    delay: Duration::ZERO,
                    callback_needed: false,
                    payload: (),
                })
            },
            move |_, ()| {
                s.fetch_add(1, Ordering::SeqCst);
            },
        )
        .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(codes.lock().is_empty(), "reply delay not honoured");
        core.shutdown().await;
        assert_eq!(*codes.lock(), vec![(ErrorCode::Success, 7)]);
        assert_eq!(silent.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_core_skips_pending_callbacks() {
        let rt = runtime();
        let (seen, cb) = recorder();
        let lifetime = {
            let core = ServiceCore::new("sms-0", 0, &rt);
            core.init(reply(ServiceStatus::Available, 100), cb()).unwrap();
            core.lifetime().clone()
        };
        assert!(lifetime.is_cancelled());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(seen.lock().is_empty());
    }
}
