//! Futures observing a promise's terminal outcome

use crate::error::PromiseResult;
use crate::promise::Shared;
use crate::record::Settlement;
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

/// Latest waker of a pending observer, woken on the terminal transition
pub(crate) struct WakerSlot {
    waker: Mutex<Option<Waker>>,
}

impl WakerSlot {
    fn new(waker: Waker) -> Arc<Self> {
        Arc::new(Self {
            waker: Mutex::new(Some(waker)),
        })
    }

    fn update(&self, waker: &Waker) {
        let mut slot = self.waker.lock();
        match slot.as_ref() {
            Some(current) if current.will_wake(waker) => {}
            _ => *slot = Some(waker.clone()),
        }
    }

    pub(crate) fn wake(&self) {
        if let Some(waker) = self.waker.lock().take() {
            waker.wake();
        }
    }
}

/// Resolves with the settlement of a promise, including `Stopped`
///
/// On the first pending poll the observer registers its waker slot with the
/// record; the check and the registration happen under the same record lock,
/// so no settlement can slip in between. Dropping the observer leaves only a
/// dead weak entry, pruned at the next registration.
pub(crate) struct Settled<T> {
    shared: Arc<Shared<T>>,
    slot: Option<Arc<WakerSlot>>,
}

impl<T> Settled<T> {
    pub(crate) fn new(shared: Arc<Shared<T>>) -> Self {
        Self { shared, slot: None }
    }
}

impl<T: Clone + Send + 'static> Future for Settled<T> {
    type Output = Settlement<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut record = this.shared.record();

        if let Some(settlement) = record.settlement() {
            return Poll::Ready(settlement);
        }

        match &this.slot {
            Some(slot) => slot.update(cx.waker()),
            None => {
                let slot = WakerSlot::new(cx.waker().clone());
                record.observe(&slot);
                this.slot = Some(slot);
            }
        }

        Poll::Pending
    }
}

/// Future returned by [`Promise::wait`](crate::Promise::wait)
///
/// Yields the stored value, the stored cause, or
/// [`PromiseError::Cancelled`](crate::PromiseError::Cancelled) for a stopped
/// promise.
pub struct Wait<T> {
    settled: Settled<T>,
}

impl<T> Wait<T> {
    pub(crate) fn new(settled: Settled<T>) -> Self {
        Self { settled }
    }
}

impl<T: Clone + Send + 'static> Future for Wait<T> {
    type Output = PromiseResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.settled)
            .poll(cx)
            .map(Settlement::into_result)
    }
}
