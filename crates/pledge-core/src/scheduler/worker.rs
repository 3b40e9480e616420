//! Worker thread that runs Tasks

use crate::scheduler::scheduler::Counters;
use crate::scheduler::task::{RunOutcome, Task};
use crossbeam::channel::Receiver;
use crossbeam::select;
use std::io;
use std::sync::Arc;
use std::thread;

/// Worker thread pulling Tasks from the shared run queue
pub(crate) struct Worker {
    id: usize,
    handle: Option<thread::JoinHandle<()>>,
}

impl Worker {
    /// Spawn the worker thread
    ///
    /// The worker exits once `shutdown` disconnects, abandoning whatever is
    /// still queued.
    pub(crate) fn spawn(
        id: usize,
        name_prefix: &str,
        queue: Receiver<Arc<Task>>,
        shutdown: Receiver<()>,
        counters: Arc<Counters>,
    ) -> io::Result<Self> {
        let handle = thread::Builder::new()
            .name(format!("{}-{}", name_prefix, id))
            .spawn(move || Worker::run_loop(id, queue, shutdown, counters))?;

        Ok(Self {
            id,
            handle: Some(handle),
        })
    }

    /// Worker index within its pool
    pub(crate) fn id(&self) -> usize {
        self.id
    }

    /// Whether this worker runs on the calling thread
    pub(crate) fn is_current(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| handle.thread().id() == thread::current().id())
            .unwrap_or(false)
    }

    /// Wait for the worker thread to exit
    pub(crate) fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("worker {} panicked", self.id);
            }
        }
    }

    fn run_loop(
        id: usize,
        queue: Receiver<Arc<Task>>,
        shutdown: Receiver<()>,
        counters: Arc<Counters>,
    ) {
        log::debug!("worker {} started", id);

        loop {
            let task = select! {
                recv(queue) -> task => match task {
                    Ok(task) => task,
                    Err(_) => break,
                },
                recv(shutdown) -> _ => break,
            };

            match task.run() {
                RunOutcome::Completed => counters.task_finished(false),
                RunOutcome::Cancelled => counters.task_finished(true),
                RunOutcome::Suspended | RunOutcome::Idle => {}
            }
        }

        log::debug!("worker {} stopped", id);
    }
}
