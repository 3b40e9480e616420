//! Worker pool and run queue

use crate::error::SchedulerError;
use crate::scheduler::task::Task;
use crate::scheduler::worker::Worker;
use crossbeam::channel::{self, Sender};
use parking_lot::Mutex;
use std::env;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Environment variable overriding the global pool's worker count
pub const WORKERS_ENV: &str = "PLEDGE_WORKERS";

/// Worker pool configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Number of worker threads; 0 means one per CPU core
    pub worker_count: usize,

    /// Worker thread names are `{prefix}-{index}`
    pub thread_name_prefix: String,
}

impl SchedulerConfig {
    /// Configuration with a fixed worker count
    pub fn with_workers(worker_count: usize) -> Self {
        Self {
            worker_count,
            ..Self::default()
        }
    }

    /// Default configuration, with the worker count taken from
    /// `PLEDGE_WORKERS` when it holds a number
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = env::var(WORKERS_ENV) {
            match raw.trim().parse::<usize>() {
                Ok(count) => config.worker_count = count,
                Err(_) => log::warn!("ignoring {}={:?}: not a number", WORKERS_ENV, raw),
            }
        }
        config
    }

    /// Worker count after resolving 0 to the number of CPU cores
    pub fn resolved_workers(&self) -> usize {
        if self.worker_count == 0 {
            num_cpus::get()
        } else {
            self.worker_count
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_count: 0,
            thread_name_prefix: "pledge-worker".to_string(),
        }
    }
}

/// Scheduler statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Total tasks spawned
    pub tasks_spawned: u64,

    /// Total tasks whose future ran to completion
    pub tasks_completed: u64,

    /// Total tasks dropped after cancellation
    pub tasks_cancelled: u64,

    /// Tasks spawned but neither completed nor cancelled
    pub active_tasks: u64,
}

/// Task counters shared with the workers
#[derive(Debug, Default)]
pub(crate) struct Counters {
    spawned: AtomicU64,
    completed: AtomicU64,
    cancelled: AtomicU64,
}

impl Counters {
    fn task_spawned(&self) {
        self.spawned.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn task_finished(&self, cancelled: bool) {
        let counter = if cancelled {
            &self.cancelled
        } else {
            &self.completed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> SchedulerStats {
        let tasks_spawned = self.spawned.load(Ordering::Relaxed);
        let tasks_completed = self.completed.load(Ordering::Relaxed);
        let tasks_cancelled = self.cancelled.load(Ordering::Relaxed);
        SchedulerStats {
            tasks_spawned,
            tasks_completed,
            tasks_cancelled,
            active_tasks: tasks_spawned.saturating_sub(tasks_completed + tasks_cancelled),
        }
    }
}

/// Fixed pool of workers sharing one run queue
pub struct Scheduler {
    queue: Sender<Arc<Task>>,

    /// Dropping this sender tells every worker to exit
    shutdown: Mutex<Option<Sender<()>>>,

    workers: Mutex<Vec<Worker>>,

    worker_count: usize,

    counters: Arc<Counters>,

    running: AtomicBool,
}

static GLOBAL: Mutex<Option<Arc<Scheduler>>> = parking_lot::const_mutex(None);

impl Scheduler {
    /// Create a pool and start its workers
    ///
    /// A worker that fails to spawn is logged and skipped; a pool left with
    /// no workers rejects every spawn with [`SchedulerError::NoWorkers`].
    pub fn new(config: SchedulerConfig) -> Arc<Self> {
        let count = config.resolved_workers();
        let (queue, tasks) = channel::unbounded();
        let (shutdown, stop) = channel::bounded::<()>(0);
        let counters = Arc::new(Counters::default());

        let mut workers = Vec::with_capacity(count);
        for id in 0..count {
            match Worker::spawn(
                id,
                &config.thread_name_prefix,
                tasks.clone(),
                stop.clone(),
                counters.clone(),
            ) {
                Ok(worker) => workers.push(worker),
                Err(e) => log::error!("failed to spawn worker {}: {}", id, e),
            }
        }

        let worker_count = workers.len();
        log::info!("scheduler started with {} workers", worker_count);

        Arc::new(Self {
            queue,
            shutdown: Mutex::new(Some(shutdown)),
            workers: Mutex::new(workers),
            worker_count,
            counters,
            running: AtomicBool::new(true),
        })
    }

    /// Process-wide pool used by the default backend
    ///
    /// Created on first use from [`SchedulerConfig::from_env`], and created
    /// again if the previous one was shut down.
    pub fn global() -> Arc<Scheduler> {
        let mut global = GLOBAL.lock();
        match global.as_ref() {
            Some(scheduler) if !scheduler.is_shut_down() => scheduler.clone(),
            _ => {
                let scheduler = Scheduler::new(SchedulerConfig::from_env());
                *global = Some(scheduler.clone());
                scheduler
            }
        }
    }

    /// Shut the process-wide pool down, if it exists
    pub fn shutdown_global() {
        let scheduler = GLOBAL.lock().take();
        if let Some(scheduler) = scheduler {
            scheduler.shutdown();
        }
    }

    /// Run a future on the pool
    pub fn spawn<F>(&self, future: F) -> Result<Arc<Task>, SchedulerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let task = self.create_task(Box::pin(future))?;
        self.submit(&task)?;
        Ok(task)
    }

    /// Create a task without queueing it
    pub(crate) fn create_task(
        &self,
        future: crate::body::BoxFuture,
    ) -> Result<Arc<Task>, SchedulerError> {
        if self.is_shut_down() {
            return Err(SchedulerError::ShutDown);
        }
        if self.worker_count == 0 {
            return Err(SchedulerError::NoWorkers);
        }
        self.counters.task_spawned();
        Ok(Task::new(future, self.queue.clone()))
    }

    /// Queue a task created by [`create_task`](Self::create_task)
    pub(crate) fn submit(&self, task: &Arc<Task>) -> Result<(), SchedulerError> {
        if self.is_shut_down() || !task.schedule() {
            self.counters.task_finished(true);
            return Err(SchedulerError::ShutDown);
        }
        Ok(())
    }

    /// Stop the workers and wait for them to exit
    ///
    /// Tasks still queued or suspended are abandoned and never polled again.
    /// Idempotent.
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }

        drop(self.shutdown.lock().take());

        let mut workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers.iter_mut() {
            if worker.is_current() {
                log::warn!("worker {} shutting down its own pool", worker.id());
                continue;
            }
            worker.join();
        }

        log::info!("scheduler shut down");
    }

    /// Whether [`shutdown`](Self::shutdown) was called
    pub fn is_shut_down(&self) -> bool {
        !self.running.load(Ordering::Acquire)
    }

    /// Number of workers that started
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Get scheduler statistics
    pub fn stats(&self) -> SchedulerStats {
        self.counters.snapshot()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("worker_count", &self.worker_count)
            .field("running", &!self.is_shut_down())
            .finish()
    }
}
