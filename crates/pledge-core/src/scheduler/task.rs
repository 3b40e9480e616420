//! Task structure and execution state

use crate::body::BoxFuture;
use crossbeam::channel::Sender;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};

/// Unique identifier for a Task
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

impl TaskId {
    /// Generate a new unique TaskId
    pub fn new() -> Self {
        TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

/// State of a Task
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TaskState {
    /// Just created, not yet scheduled
    Created,
    /// Currently being polled by a worker
    Running,
    /// Waiting for a wake-up
    Suspended,
    /// Body future finished
    Completed,
    /// Dropped before finishing
    Cancelled,
}

/// Outcome of one run of a task on a worker
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum RunOutcome {
    /// Future returned `Pending` and waits for a wake-up
    Suspended,
    /// Future finished on this run
    Completed,
    /// Future dropped because the task was cancelled
    Cancelled,
    /// Stale queue entry for a task that already finished
    Idle,
}

/// A promise body scheduled on the cooperative pool
///
/// The task is its own waker: waking it pushes it back onto the run queue
/// unless it is already queued.
pub struct Task {
    id: TaskId,
    state: Mutex<TaskState>,
    future: Mutex<Option<BoxFuture>>,
    /// Set while the task sits in the run queue
    scheduled: AtomicBool,
    cancelled: AtomicBool,
    queue: Sender<Arc<Task>>,
}

impl Task {
    pub(crate) fn new(future: BoxFuture, queue: Sender<Arc<Task>>) -> Arc<Self> {
        Arc::new(Self {
            id: TaskId::new(),
            state: Mutex::new(TaskState::Created),
            future: Mutex::new(Some(future)),
            scheduled: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            queue,
        })
    }

    /// Get the Task's unique ID
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Get the current state
    pub fn state(&self) -> TaskState {
        *self.state.lock()
    }

    fn set_state(&self, state: TaskState) {
        *self.state.lock() = state;
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Push the task onto the run queue unless it is already there
    ///
    /// Returns false if the queue is closed.
    pub(crate) fn schedule(self: &Arc<Self>) -> bool {
        if self.scheduled.swap(true, Ordering::AcqRel) {
            return true;
        }
        if self.queue.send(self.clone()).is_err() {
            log::trace!("task {} not queued: scheduler closed", self.id.as_u64());
            return false;
        }
        true
    }

    /// Request cancellation; the future is dropped on its next run
    pub(crate) fn cancel(self: &Arc<Self>) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            self.schedule();
        }
    }

    /// Poll the future once on the calling worker
    pub(crate) fn run(self: &Arc<Self>) -> RunOutcome {
        self.scheduled.store(false, Ordering::Release);

        let mut slot = self.future.lock();
        let future = match slot.as_mut() {
            Some(future) => future,
            None => return RunOutcome::Idle,
        };

        if self.is_cancelled() {
            *slot = None;
            self.set_state(TaskState::Cancelled);
            return RunOutcome::Cancelled;
        }

        self.set_state(TaskState::Running);
        let waker = Waker::from(self.clone());
        let mut cx = Context::from_waker(&waker);

        let poll = future.as_mut().poll(&mut cx);
        match poll {
            Poll::Ready(()) => {
                *slot = None;
                self.set_state(TaskState::Completed);
                RunOutcome::Completed
            }
            Poll::Pending if self.is_cancelled() => {
                *slot = None;
                self.set_state(TaskState::Cancelled);
                RunOutcome::Cancelled
            }
            Poll::Pending => {
                self.set_state(TaskState::Suspended);
                RunOutcome::Suspended
            }
        }
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id.as_u64())
            .field("state", &self.state())
            .finish()
    }
}

impl Wake for Task {
    fn wake(self: Arc<Self>) {
        self.schedule();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.schedule();
    }
}
