//! Timer thread backing `sleep` and `delay`
//!
//! Instead of parking an execution unit per sleeper, one timer thread waits
//! for the earliest deadline using condvar timeouts and wakes the registered
//! wakers when they expire.

use once_cell::sync::Lazy;
use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Entry in the timer heap
struct SleepEntry {
    /// When to fire
    wake_at: Instant,
    /// Registration order, breaks ties between equal deadlines
    seq: u64,
    waker: Waker,
}

// Reverse ordering for min-heap (earliest wake time first)
impl Ord for SleepEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .wake_at
            .cmp(&self.wake_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for SleepEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SleepEntry {
    fn eq(&self, other: &Self) -> bool {
        self.wake_at == other.wake_at && self.seq == other.seq
    }
}

impl Eq for SleepEntry {}

struct TimerState {
    sleeping: BinaryHeap<SleepEntry>,
    next_seq: u64,
}

/// Thread firing wakers at their deadlines
pub struct TimerThread {
    state: Mutex<TimerState>,
    /// Wakes the timer thread when an entry is added or on shutdown
    notify: Condvar,
    shutdown: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
}

static TIMER: Lazy<Arc<TimerThread>> = Lazy::new(|| {
    let timer = TimerThread::new();
    timer.start();
    timer
});

impl TimerThread {
    /// Create a timer that is not running yet
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(TimerState {
                sleeping: BinaryHeap::new(),
                next_seq: 0,
            }),
            notify: Condvar::new(),
            shutdown: AtomicBool::new(false),
            handle: Mutex::new(None),
        })
    }

    /// Start the timer thread
    pub fn start(self: &Arc<Self>) {
        let timer = Arc::clone(self);

        let handle = thread::Builder::new()
            .name("pledge-timer".to_string())
            .spawn(move || timer.run_loop())
            .expect("Failed to spawn timer thread");

        *self.handle.lock() = Some(handle);
    }

    /// Stop the timer thread; pending wakers are dropped without firing
    pub fn stop(&self) {
        {
            let _state = self.state.lock();
            self.shutdown.store(true, AtomicOrdering::Release);
            self.notify.notify_one();
        }

        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                log::error!("timer thread panicked");
            }
        }
    }

    /// Wake `waker` once `wake_at` has passed
    pub fn register(&self, wake_at: Instant, waker: Waker) {
        let mut state = self.state.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.sleeping.push(SleepEntry {
            wake_at,
            seq,
            waker,
        });
        // The new entry may be earlier than the one being waited on
        self.notify.notify_one();
    }

    /// Number of registrations that have not fired yet
    pub fn sleeping_count(&self) -> usize {
        self.state.lock().sleeping.len()
    }

    fn run_loop(&self) {
        let mut state = self.state.lock();
        loop {
            if self.shutdown.load(AtomicOrdering::Acquire) {
                break;
            }

            let now = Instant::now();
            let mut due = Vec::new();
            while let Some(entry) = state.sleeping.peek() {
                if entry.wake_at > now {
                    break;
                }
                if let Some(entry) = state.sleeping.pop() {
                    due.push(entry.waker);
                }
            }

            if !due.is_empty() {
                // Wakers may re-register, so fire them without the lock
                drop(state);
                for waker in due {
                    waker.wake();
                }
                state = self.state.lock();
                continue;
            }

            match state.sleeping.peek().map(|next| next.wake_at) {
                Some(wake_at) => {
                    let timeout = wake_at.saturating_duration_since(Instant::now());
                    self.notify.wait_for(&mut state, timeout);
                }
                None => self.notify.wait(&mut state),
            }
        }

        log::debug!("timer thread shutting down");
    }
}

/// Future completing once its deadline has passed
#[derive(Debug)]
pub struct Sleep {
    deadline: Instant,
    registered: Option<Waker>,
}

impl Future for Sleep {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if Instant::now() >= self.deadline {
            return Poll::Ready(());
        }

        let stale = match &self.registered {
            Some(waker) => !waker.will_wake(cx.waker()),
            None => true,
        };
        if stale {
            let waker = cx.waker().clone();
            TIMER.register(self.deadline, waker.clone());
            self.registered = Some(waker);
        }

        Poll::Pending
    }
}

/// Sleep for `duration` without blocking the execution unit
///
/// Works on both backends; the calling task is suspended and re-queued by the
/// timer thread.
pub fn sleep(duration: Duration) -> Sleep {
    Sleep {
        deadline: Instant::now() + duration,
        registered: None,
    }
}
