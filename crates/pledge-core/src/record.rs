//! Settlement record shared by a Promise and its Resolver
//!
//! The record is always accessed under its owner's mutex. Every transition
//! method checks the settle-once condition and hands back the drained
//! callback batch, so the caller can invoke it after releasing the lock.

use crate::error::{PromiseError, PromiseResult};
use crate::settle::WakerSlot;
use crate::state::PromiseState;
use std::sync::{Arc, Weak};
use std::time::Instant;

/// Continuation fired once with the settled value
pub(crate) type ResolveCallback<T> = Box<dyn FnOnce(&T) + Send>;

/// Continuation fired once with the rejection cause
pub(crate) type RejectCallback = Box<dyn FnOnce(&PromiseError) + Send>;

/// Continuation fired once when the promise is cancelled
pub(crate) type StopCallback = Box<dyn FnOnce() + Send>;

/// Terminal outcome as observed by awaiters and chained dependents
#[derive(Debug, Clone)]
pub(crate) enum Settlement<T> {
    /// Settled with a value
    Value(T),
    /// Settled with a cause
    Cause(PromiseError),
    /// Cancelled
    Stopped,
}

impl<T> Settlement<T> {
    pub(crate) fn into_result(self) -> PromiseResult<T> {
        match self {
            Settlement::Value(value) => Ok(value),
            Settlement::Cause(cause) => Err(cause),
            Settlement::Stopped => Err(PromiseError::Cancelled),
        }
    }
}

/// Callbacks and observers drained by one terminal transition
pub(crate) struct Drained<C> {
    callbacks: Vec<C>,
    observers: Vec<Arc<WakerSlot>>,
}

impl<C> Drained<C> {
    pub(crate) fn len(&self) -> usize {
        self.callbacks.len()
    }

    /// Invoke the callbacks in registration order, then wake the observers
    pub(crate) fn fire(self, mut invoke: impl FnMut(C)) {
        for callback in self.callbacks {
            invoke(callback);
        }
        for observer in self.observers {
            observer.wake();
        }
    }
}

pub(crate) struct Record<T> {
    state: PromiseState,
    value: Option<T>,
    cause: Option<PromiseError>,
    ended_at: Option<Instant>,
    resolve_callbacks: Vec<ResolveCallback<T>>,
    reject_callbacks: Vec<RejectCallback>,
    stop_callbacks: Vec<StopCallback>,
    observers: Vec<Weak<WakerSlot>>,
}

impl<T: Clone> Record<T> {
    pub(crate) fn new() -> Self {
        Self {
            state: PromiseState::Idle,
            value: None,
            cause: None,
            ended_at: None,
            resolve_callbacks: Vec::new(),
            reject_callbacks: Vec::new(),
            stop_callbacks: Vec::new(),
            observers: Vec::new(),
        }
    }

    pub(crate) fn state(&self) -> PromiseState {
        self.state
    }

    pub(crate) fn ended_at(&self) -> Option<Instant> {
        self.ended_at
    }

    /// Snapshot of the terminal outcome, `None` while pending
    pub(crate) fn settlement(&self) -> Option<Settlement<T>> {
        match self.state {
            PromiseState::Completed => self.value.clone().map(Settlement::Value),
            PromiseState::Rejected => self.cause.clone().map(Settlement::Cause),
            PromiseState::Stopped => Some(Settlement::Stopped),
            PromiseState::Idle | PromiseState::Running => None,
        }
    }

    /// `Idle → Running`; returns false in any other state
    pub(crate) fn mark_running(&mut self) -> bool {
        if self.state != PromiseState::Idle {
            return false;
        }
        self.state = PromiseState::Running;
        true
    }

    /// Store the value and drain the resolve batch, `None` if already done
    pub(crate) fn complete(&mut self, value: T) -> Option<Drained<ResolveCallback<T>>> {
        if self.state.is_done() {
            return None;
        }
        self.value = Some(value);
        self.finish(PromiseState::Completed);
        self.reject_callbacks.clear();
        self.stop_callbacks.clear();
        let callbacks = std::mem::take(&mut self.resolve_callbacks);
        Some(self.drain(callbacks))
    }

    /// Store the cause and drain the reject batch, `None` if already done
    pub(crate) fn fail(&mut self, cause: PromiseError) -> Option<Drained<RejectCallback>> {
        if self.state.is_done() {
            return None;
        }
        self.cause = Some(cause);
        self.finish(PromiseState::Rejected);
        self.resolve_callbacks.clear();
        self.stop_callbacks.clear();
        let callbacks = std::mem::take(&mut self.reject_callbacks);
        Some(self.drain(callbacks))
    }

    /// Force `Stopped` and drain the stop batch, `None` if already done
    ///
    /// Resolve and reject callbacks are dropped without being invoked.
    pub(crate) fn stop(&mut self) -> Option<Drained<StopCallback>> {
        if self.state.is_done() {
            return None;
        }
        self.finish(PromiseState::Stopped);
        self.resolve_callbacks.clear();
        self.reject_callbacks.clear();
        let callbacks = std::mem::take(&mut self.stop_callbacks);
        Some(self.drain(callbacks))
    }

    pub(crate) fn on_resolve(&mut self, callback: ResolveCallback<T>) {
        self.resolve_callbacks.push(callback);
    }

    pub(crate) fn on_reject(&mut self, callback: RejectCallback) {
        self.reject_callbacks.push(callback);
    }

    pub(crate) fn on_stop(&mut self, callback: StopCallback) {
        self.stop_callbacks.push(callback);
    }

    /// Wake `slot` on whichever terminal transition comes first
    ///
    /// Entries of observers dropped since the last registration are pruned
    /// here, so a promise that never settles holds at most one stale entry.
    pub(crate) fn observe(&mut self, slot: &Arc<WakerSlot>) {
        self.observers.retain(|observer| observer.strong_count() > 0);
        self.observers.push(Arc::downgrade(slot));
    }

    #[cfg(test)]
    pub(crate) fn observer_count(&self) -> usize {
        self.observers.len()
    }

    fn drain<C>(&mut self, callbacks: Vec<C>) -> Drained<C> {
        let observers = self
            .observers
            .drain(..)
            .filter_map(|observer| observer.upgrade())
            .collect();
        Drained {
            callbacks,
            observers,
        }
    }

    fn finish(&mut self, state: PromiseState) {
        debug_assert!(state.is_done());
        self.state = state;
        self.ended_at = Some(Instant::now());
    }
}
