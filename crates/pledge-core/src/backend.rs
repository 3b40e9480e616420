//! Execution backends: where promise bodies run

use crate::body::{self, BoxFuture};
use crate::error::{PromiseResult, SchedulerError};
use crate::promise::Promise;
use crate::resolver::Resolver;
use crate::scheduler::{Scheduler, Task};
use crate::thread::ThreadUnit;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Strategy for running promise bodies
///
/// Both backends give the same observable semantics. A promise's backend is
/// inherited by everything chained from it.
#[derive(Clone)]
pub enum Backend {
    /// Bodies are tasks on a worker pool; awaiting suspends the task
    /// without holding a worker
    Cooperative(Arc<Scheduler>),

    /// Every body gets its own OS thread; awaiting parks that thread
    Thread,
}

impl Backend {
    /// Cooperative backend on the process-wide pool
    pub fn cooperative() -> Self {
        Backend::Cooperative(Scheduler::global())
    }

    /// Cooperative backend on a caller-owned pool
    pub fn with_scheduler(scheduler: Arc<Scheduler>) -> Self {
        Backend::Cooperative(scheduler)
    }

    /// Whether bodies run as pool tasks
    pub fn is_cooperative(&self) -> bool {
        matches!(self, Backend::Cooperative(_))
    }

    /// Start `body` and return the promise it settles
    ///
    /// The body receives the promise's resolver and may settle it at any
    /// point, including after awaiting other promises. Returning `Err` or
    /// panicking rejects the promise unless it already settled. If the
    /// backend cannot start the body the promise is rejected with a
    /// [`SchedulerError`].
    pub fn promise<T, F, Fut>(&self, body: F) -> Promise<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce(Resolver<T>) -> Fut + Send + 'static,
        Fut: Future<Output = PromiseResult<()>> + Send + 'static,
    {
        let promise = Promise::detached(self.clone());
        let resolver = promise.resolver();
        let future = body::execute(resolver.clone(), body);

        if let Err(error) = self.launch(&promise, future) {
            log::error!("failed to start promise {}: {}", promise.id(), error);
            resolver.reject(error.into());
        }
        promise
    }

    fn launch<T>(&self, promise: &Promise<T>, future: BoxFuture) -> Result<(), SchedulerError>
    where
        T: Clone + Send + 'static,
    {
        match self {
            Backend::Cooperative(scheduler) => {
                let task = scheduler.create_task(future)?;
                promise.attach(ExecutionUnit::Task(task.clone()));
                scheduler.submit(&task)
            }
            Backend::Thread => {
                let unit = ThreadUnit::new(promise.id());
                promise.attach(ExecutionUnit::Thread(unit.clone()));
                unit.start(future)?;
                Ok(())
            }
        }
    }
}

impl Default for Backend {
    /// The cooperative backend on the process-wide pool
    fn default() -> Self {
        Backend::cooperative()
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Cooperative(scheduler) => f
                .debug_tuple("Cooperative")
                .field(&scheduler.worker_count())
                .finish(),
            Backend::Thread => f.write_str("Thread"),
        }
    }
}

/// Handle on whatever is driving a promise body
pub(crate) enum ExecutionUnit {
    Task(Arc<Task>),
    Thread(Arc<ThreadUnit>),
}

impl ExecutionUnit {
    /// Stop driving the body; the unit drops it at the next suspension point
    pub(crate) fn interrupt(&self) {
        match self {
            ExecutionUnit::Task(task) => task.cancel(),
            ExecutionUnit::Thread(unit) => unit.interrupt(),
        }
    }
}
