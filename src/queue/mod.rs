//! # Deferred completion queue.
//!
//! - [`Task`] a named unit of deferred work with an artificial delay and an optional lifetime guard
//! - [`TaskQueue`] accepts tasks, runs each exactly once off the caller's thread and tracks them
//!   until shutdown
//!
//! ```text
//! submit(task) ─────────► tokio::spawn ─► sleep(delay) ─► guard alive? ─► body
//!                              (one per task, unordered)           └─► skip (TaskSkipped)
//!
//! submit_ordered(task) ─► [unbounded FIFO] ─► ordered worker ─► sleep(delay) ─► body
//!                                            (single, lazily spawned)
//! ```

mod task;
mod task_queue;

pub use task::{BoxTaskFuture, Task};
pub use task_queue::TaskQueue;
