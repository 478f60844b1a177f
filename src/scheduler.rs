//! The dispatch scheduler
//!
//! One [`DispatchScheduler`] owns one event-loop thread. [`Worker`]s are the
//! only way to put work on it: a worker runs a task in place when the caller
//! already is the dispatch thread, and queues it otherwise. Cancellation is
//! cooperative: a task is checked once, right before it starts.
mod dispatch;
mod task;
mod worker;

pub use std::time::{Duration, Instant};

pub use dispatch::{DispatchScheduler, DispatchSchedulerBuilder};
pub use task::{TaskHandle, TaskStatus};
pub use worker::{Worker, MAX_DELAY};
