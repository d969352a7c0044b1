//! # Deferred unit of work.
//!
//! A [`Task`] bundles a boxed future with the delay that must elapse before it
//! runs and an optional lifetime guard. The guard is a [`CancellationToken`]
//! owned (directly or through a parent) by whoever the task calls back into:
//! once that owner is gone the token is cancelled and the task body is skipped.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use simstub::Task;
//!
//! let lifetime = CancellationToken::new();
//! let task = Task::from_fn("notify", || println!("done"))
//!     .with_delay(Duration::from_millis(100))
//!     .guarded_by(lifetime.clone());
//!
//! assert_eq!(task.name(), "notify");
//! assert_eq!(task.delay(), Duration::from_millis(100));
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

/// Boxed future executed by a [`Task`].
pub type BoxTaskFuture = BoxFuture<'static, ()>;

/// Deferred unit of work owned by a [`TaskQueue`](crate::TaskQueue) until it runs.
pub struct Task {
    name: Cow<'static, str>,
    delay: Duration,
    guard: Option<CancellationToken>,
    body: BoxTaskFuture,
}

impl Task {
    /// Creates a task from a future. The future is not polled before the task comes due.
    pub fn new<F>(name: impl Into<Cow<'static, str>>, body: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            name: name.into(),
            delay: Duration::ZERO,
            guard: None,
            body: Box::pin(body),
        }
    }

    /// Creates a task from a synchronous callback.
    pub fn from_fn<F>(name: impl Into<Cow<'static, str>>, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::new(name, async move { f() })
    }

    /// Sets the artificial delay before the body runs.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Skips the body if `token` is cancelled by the time the task comes due.
    pub fn guarded_by(mut self, token: CancellationToken) -> Self {
        self.guard = Some(token);
        self
    }

    /// Task name (for logs and runtime events).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Delay before the body runs.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Returns `true` when a guard exists and has been cancelled.
    pub(crate) fn owner_gone(&self) -> bool {
        self.guard.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    pub(crate) fn into_body(self) -> BoxTaskFuture {
        self.body
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("delay", &self.delay)
            .field("guarded", &self.guard.is_some())
            .finish()
    }
}
