//! Resolver: the capability that settles one Promise

use crate::error::{PromiseError, PromiseResult};
use crate::promise::{Promise, Shared};
use std::fmt;
use std::sync::Arc;

/// Exclusive capability to settle a single [`Promise`]
///
/// `resolve` and `reject` are settle-once: the first call wins and every
/// later call is a no-op. Both may be called from the promise's own body,
/// from another promise's handler, or from any thread.
pub struct Resolver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("promise", &self.shared.id())
            .finish()
    }
}

impl<T: Clone + Send + 'static> Resolver<T> {
    pub(crate) fn new(shared: Arc<Shared<T>>) -> Self {
        Self { shared }
    }

    /// The promise this resolver settles
    pub fn promise(&self) -> Promise<T> {
        Promise::from_shared(self.shared.clone())
    }

    /// Settle with a value
    ///
    /// Fires the resolve callbacks in registration order, then releases the
    /// execution unit driving the body.
    pub fn resolve(&self, value: T) {
        let callbacks = match self.shared.record().complete(value.clone()) {
            Some(callbacks) => callbacks,
            None => return,
        };
        log::trace!(
            "promise {} completed, {} callbacks",
            self.shared.id(),
            callbacks.len()
        );
        callbacks.fire(|callback| callback(&value));
        self.shared.release_unit();
    }

    /// Settle with a cause
    pub fn reject(&self, cause: PromiseError) {
        let callbacks = match self.shared.record().fail(cause.clone()) {
            Some(callbacks) => callbacks,
            None => return,
        };
        log::trace!(
            "promise {} rejected ({}), {} callbacks",
            self.shared.id(),
            cause,
            callbacks.len()
        );
        callbacks.fire(|callback| callback(&cause));
        self.shared.release_unit();
    }

    /// Reject with the cancellation-kind cause
    pub fn reject_cancelled(&self) {
        self.reject(PromiseError::Cancelled);
    }

    /// Resolve on `Ok`, reject on `Err`
    pub fn settle(&self, result: PromiseResult<T>) {
        match result {
            Ok(value) => self.resolve(value),
            Err(cause) => self.reject(cause),
        }
    }

    /// Cancel the bound promise
    pub(crate) fn stop(&self) {
        self.promise().cancel();
    }
}

impl Resolver<()> {
    /// Resolve a unit promise
    pub fn done(&self) {
        self.resolve(());
    }
}
