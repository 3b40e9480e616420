//! Driving a future to completion on the current OS thread

use std::future::Future;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};
use std::thread::{self, Thread};

/// Waker that unparks the thread blocked in [`block_on`]
struct ThreadWaker {
    thread: Thread,
    notified: AtomicBool,
}

impl ThreadWaker {
    fn current() -> Arc<Self> {
        Arc::new(Self {
            thread: thread::current(),
            notified: AtomicBool::new(false),
        })
    }

    /// Park until woken; consumes the notification
    fn park(&self) {
        while !self.notified.swap(false, Ordering::AcqRel) {
            thread::park();
        }
    }
}

impl Wake for ThreadWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.notified.store(true, Ordering::Release);
        self.thread.unpark();
    }
}

/// Block the current thread until `future` completes
///
/// Must not be called from a task running on a cooperative pool with a
/// single worker, since the worker would wait on work queued behind itself.
pub fn block_on<F: Future>(future: F) -> F::Output {
    let waker = ThreadWaker::current();
    let task_waker = Waker::from(waker.clone());
    let mut cx = Context::from_waker(&task_waker);
    let mut future = pin!(future);

    loop {
        if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
            return output;
        }
        waker.park();
    }
}

/// Drive `future` until it completes or `interrupted` is raised
///
/// Returns `None` when interrupted. The interrupt flag is checked before each
/// poll; whoever raises it must unpark this thread.
pub(crate) fn block_on_interruptible<F: Future>(
    future: F,
    interrupted: &AtomicBool,
) -> Option<F::Output> {
    let waker = ThreadWaker::current();
    let task_waker = Waker::from(waker.clone());
    let mut cx = Context::from_waker(&task_waker);
    let mut future = pin!(future);

    loop {
        if interrupted.load(Ordering::Acquire) {
            return None;
        }
        if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
            return Some(output);
        }
        // A plain unpark from the interrupter leaves `notified` unset
        if interrupted.load(Ordering::Acquire) {
            return None;
        }
        thread::park();
        waker.notified.store(false, Ordering::Release);
    }
}
