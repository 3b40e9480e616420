//! Cooperative scheduler backing the default promise backend
//!
//! A fixed pool of worker threads pulls ready tasks from one shared queue and
//! polls them. A task that has to wait is parked until its waker pushes it
//! back onto the queue, so a worker never blocks on a pending promise.

#[allow(clippy::module_inception)]
mod scheduler;
mod task;
mod worker;

pub use scheduler::{Scheduler, SchedulerConfig, SchedulerStats};
pub use task::{Task, TaskId, TaskState};
