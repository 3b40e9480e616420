//! Dedicated-thread execution unit

use crate::blocking;
use crate::body::BoxFuture;
use crate::promise::PromiseId;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, Thread};

thread_local! {
    /// Unit driving the body on this thread, if any
    static CURRENT: RefCell<Option<Arc<ThreadUnit>>> = const { RefCell::new(None) };
}

/// One OS thread driving one promise body
///
/// Created and attached to its promise before the thread starts, so an
/// interrupt raised in between is seen by the first check of the loop.
pub(crate) struct ThreadUnit {
    promise: PromiseId,
    interrupted: AtomicBool,
    thread: Mutex<Option<Thread>>,
}

impl ThreadUnit {
    pub(crate) fn new(promise: PromiseId) -> Arc<Self> {
        Arc::new(Self {
            promise,
            interrupted: AtomicBool::new(false),
            thread: Mutex::new(None),
        })
    }

    /// Spawn the thread and drive `future` on it until done or interrupted
    pub(crate) fn start(self: &Arc<Self>, future: BoxFuture) -> io::Result<()> {
        let unit = self.clone();
        let handle = thread::Builder::new()
            .name(format!("pledge-promise-{}", self.promise.as_u64()))
            .spawn(move || {
                CURRENT.with(|current| *current.borrow_mut() = Some(unit.clone()));
                if unit.block_on(future).is_none() {
                    log::trace!("promise {} thread interrupted", unit.promise);
                }
                CURRENT.with(|current| current.borrow_mut().take());
            })?;

        *self.thread.lock() = Some(handle.thread().clone());
        if self.is_interrupted() {
            handle.thread().unpark();
        }
        Ok(())
    }

    /// Stop driving the body at its next suspension point
    pub(crate) fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Release);
        if let Some(thread) = self.thread.lock().as_ref() {
            thread.unpark();
        }
    }

    pub(crate) fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }

    /// Drive `future` on the calling thread; `None` once interrupted
    pub(crate) fn block_on<F: Future>(&self, future: F) -> Option<F::Output> {
        blocking::block_on_interruptible(future, &self.interrupted)
    }

    /// Unit of the promise body running on the calling thread
    pub(crate) fn current() -> Option<Arc<ThreadUnit>> {
        CURRENT.with(|current| current.borrow().clone())
    }
}
