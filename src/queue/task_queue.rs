//! # TaskQueue: exactly-once deferred execution with clean shutdown.
//!
//! Every manager owns one queue. Completions (init callbacks, request
//! responses, replayed readiness callbacks) are submitted here instead of being
//! run inline, so the caller never re-enters application code on its own stack.
//!
//! ## Lanes
//! - **Async lane** ([`TaskQueue::submit`]): one tokio task per submission. No
//!   ordering between tasks; each task waits for its own delay.
//! - **Ordered lane** ([`TaskQueue::submit_ordered`]): a single worker, spawned on
//!   first use, runs tasks strictly in submission order.
//!
//! ## Rules
//! - A task body runs **at most once** and never before its delay elapsed.
//! - A guarded task whose token is cancelled is skipped (`TaskSkipped`).
//! - A panicking body is contained and reported (`TaskPanicked`); the queue keeps working.
//! - After [`TaskQueue::shutdown`] starts, submissions fail with [`StubError::NotAllowed`].
//! - `shutdown` must not be awaited from inside a task of the same queue (it would wait on itself).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::{StubError, StubResult};
use crate::events::{Bus, Event, EventKind, panic_message};
use crate::queue::Task;

/// Single ordered worker and its feed.
struct OrderedLane {
    tx: mpsc::UnboundedSender<Task>,
    stop: CancellationToken,
    worker: JoinHandle<()>,
}

/// Per-manager queue of deferred completions.
pub struct TaskQueue {
    name: Arc<str>,
    bus: Bus,
    shutting_down: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    ordered: Mutex<Option<OrderedLane>>,
    ordered_backlog: Arc<AtomicUsize>,
}

impl TaskQueue {
    /// Creates an empty queue. No worker is spawned until the first submission.
    pub fn new(name: impl Into<Arc<str>>, bus: Bus) -> Self {
        Self {
            name: name.into(),
            bus,
            shutting_down: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
            ordered: Mutex::new(None),
            ordered_backlog: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queue name used in runtime events.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Submits a task on the async lane and returns immediately.
    ///
    /// ### Errors
    /// - [`StubError::NotAllowed`] once shutdown has started
    /// - [`StubError::Failed`] when no tokio runtime is available to host the task
    pub fn submit(&self, task: Task) -> StubResult<()> {
        let handle = self.runtime_handle()?;
        let mut tasks = self.tasks.lock();
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(StubError::NotAllowed);
        }
        tasks.retain(|h| !h.is_finished());

        self.publish_submitted(&task);
        let name = Arc::clone(&self.name);
        let bus = self.bus.clone();
        tasks.push(handle.spawn(run_task(name, bus, task)));
        Ok(())
    }

    /// Submits a task on the ordered lane.
    ///
    /// Ordered tasks run one at a time in submission order; a task's delay also
    /// holds back every task queued after it.
    ///
    /// ### Errors
    /// Same as [`TaskQueue::submit`].
    pub fn submit_ordered(&self, task: Task) -> StubResult<()> {
        let handle = self.runtime_handle()?;
        let mut lane = self.ordered.lock();
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(StubError::NotAllowed);
        }
        let lane = lane.get_or_insert_with(|| self.spawn_ordered_worker(&handle));

        self.publish_submitted(&task);
        self.ordered_backlog.fetch_add(1, Ordering::AcqRel);
        lane.tx.send(task).map_err(|_| {
            self.ordered_backlog.fetch_sub(1, Ordering::AcqRel);
            StubError::failed("ordered worker is gone")
        })
    }

    /// Number of tasks submitted but not finished yet (both lanes).
    pub fn pending(&self) -> usize {
        let mut tasks = self.tasks.lock();
        tasks.retain(|h| !h.is_finished());
        tasks.len() + self.ordered_backlog.load(Ordering::Acquire)
    }

    /// Returns `true` once [`TaskQueue::shutdown`] was called.
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Stops accepting work and waits for every async-lane task to finish.
    ///
    /// 1. Flags the queue (new submissions fail with `NotAllowed`)
    /// 2. Stops the ordered worker; ordered tasks not yet started are dropped
    /// 3. Awaits all outstanding async-lane tasks
    ///
    /// Idempotent: later calls return immediately.
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(queue = %self.name, "task queue shutdown started");

        let lane = self.ordered.lock().take();
        if let Some(lane) = lane {
            lane.stop.cancel();
            drop(lane.tx);
            let _ = lane.worker.await;
            let dropped = self.ordered_backlog.swap(0, Ordering::AcqRel);
            if dropped > 0 {
                debug!(queue = %self.name, dropped, "ordered tasks left on shutdown");
            }
        }

        loop {
            let handles = std::mem::take(&mut *self.tasks.lock());
            if handles.is_empty() {
                break;
            }
            for h in handles {
                let _ = h.await;
            }
        }
        debug!(queue = %self.name, "task queue shutdown complete");
    }

    fn runtime_handle(&self) -> StubResult<Handle> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(StubError::NotAllowed);
        }
        Handle::try_current().map_err(|_| StubError::failed("no tokio runtime to host the task"))
    }

    fn spawn_ordered_worker(&self, handle: &Handle) -> OrderedLane {
        let (tx, mut rx) = mpsc::unbounded_channel::<Task>();
        let stop = CancellationToken::new();
        let name = Arc::clone(&self.name);
        let bus = self.bus.clone();
        let backlog = Arc::clone(&self.ordered_backlog);
        let stop_rx = stop.clone();

        let worker = handle.spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = stop_rx.cancelled() => break,
                    next = rx.recv() => match next {
                        Some(task) => {
                            run_task(Arc::clone(&name), bus.clone(), task).await;
                            backlog.fetch_sub(1, Ordering::AcqRel);
                        }
                        None => break,
                    }
                }
            }
        });
        debug!(queue = %self.name, "ordered worker started");
        OrderedLane { tx, stop, worker }
    }

    fn publish_submitted(&self, task: &Task) {
        self.bus.publish(
            Event::new(EventKind::TaskSubmitted)
                .with_source(Arc::clone(&self.name))
                .with_reason(task.name())
                .with_delay(task.delay()),
        );
    }
}

/// Waits for the task's delay, checks its guard and runs the body with panic isolation.
async fn run_task(queue: Arc<str>, bus: Bus, task: Task) {
    if !task.delay().is_zero() {
        tokio::time::sleep(task.delay()).await;
    }

    let task_name: Arc<str> = Arc::from(task.name());
    if task.owner_gone() {
        debug!(queue = %queue, task = %task_name, "owner gone, task skipped");
        bus.publish(
            Event::new(EventKind::TaskSkipped)
                .with_source(queue)
                .with_reason(task_name),
        );
        return;
    }

    let body = task.into_body();
    match std::panic::AssertUnwindSafe(body).catch_unwind().await {
        Ok(()) => {
            bus.publish(
                Event::new(EventKind::TaskCompleted)
                    .with_source(queue)
                    .with_reason(task_name),
            );
        }
        Err(panic_err) => {
            let info = panic_message(&*panic_err);
            error!(queue = %queue, task = %task_name, panic = %info, "task panicked");
            bus.publish(
                Event::new(EventKind::TaskPanicked)
                    .with_source(queue)
                    .with_reason(info),
            );
        }
    }
}
