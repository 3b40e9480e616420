//! Promise handle: state machine, chaining, waiting and cancellation

use crate::backend::{Backend, ExecutionUnit};
use crate::blocking;
use crate::error::{PromiseError, PromiseResult};
use crate::record::{Record, Settlement};
use crate::resolver::Resolver;
use crate::settle::{Settled, Wait};
use crate::state::PromiseState;
use crate::thread::ThreadUnit;
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::future::{self, Future, IntoFuture};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Unique identifier for a Promise
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct PromiseId(u64);

static NEXT_PROMISE_ID: AtomicU64 = AtomicU64::new(1);

impl PromiseId {
    /// Generate a new unique PromiseId
    pub fn new() -> Self {
        PromiseId(NEXT_PROMISE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for PromiseId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PromiseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// State shared by every handle to one promise and by its resolver
pub(crate) struct Shared<T> {
    id: PromiseId,
    record: Mutex<Record<T>>,
    started_at: Instant,
    backend: Backend,
    unit: Mutex<Option<ExecutionUnit>>,
}

impl<T> Shared<T> {
    pub(crate) fn id(&self) -> PromiseId {
        self.id
    }

    pub(crate) fn record(&self) -> MutexGuard<'_, Record<T>> {
        self.record.lock()
    }

    /// Ask the execution unit to stop driving the body
    pub(crate) fn release_unit(&self) {
        if let Some(unit) = self.unit.lock().as_ref() {
            unit.interrupt();
        }
    }
}

/// Handle to the eventual outcome of an asynchronous computation
///
/// Handles are cheap to clone; every clone observes the same outcome.
pub struct Promise<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: Clone> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("id", &self.shared.id)
            .field("state", &self.shared.record().state())
            .field("backend", &self.shared.backend)
            .finish()
    }
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// Create an idle promise with no execution unit attached
    pub(crate) fn detached(backend: Backend) -> Self {
        Self {
            shared: Arc::new(Shared {
                id: PromiseId::new(),
                record: Mutex::new(Record::new()),
                started_at: Instant::now(),
                backend,
                unit: Mutex::new(None),
            }),
        }
    }

    pub(crate) fn from_shared(shared: Arc<Shared<T>>) -> Self {
        Self { shared }
    }

    /// Bind the execution unit that drives this promise's body
    pub(crate) fn attach(&self, unit: ExecutionUnit) {
        *self.shared.unit.lock() = Some(unit);
    }

    /// `Idle → Running` once the backend starts the body
    pub(crate) fn mark_running(&self) {
        if self.shared.record().mark_running() {
            log::trace!("promise {} running", self.shared.id);
        }
    }

    pub(crate) fn settled(&self) -> Settled<T> {
        Settled::new(self.shared.clone())
    }

    /// Register a value/cause pair without spawning a dependent promise
    ///
    /// Fires immediately if already settled. Cancellation reaches `on_cause`
    /// as [`PromiseError::Cancelled`].
    pub(crate) fn subscribe<V, C>(&self, on_value: V, on_cause: C)
    where
        V: FnOnce(&T) + Send + 'static,
        C: FnOnce(&PromiseError) + Send + 'static,
    {
        let mut record = self.shared.record();
        let settlement = match record.settlement() {
            Some(settlement) => settlement,
            None => {
                let on_reject = Arc::new(Mutex::new(Some(on_cause)));
                let on_stop = on_reject.clone();
                record.on_resolve(Box::new(on_value));
                record.on_reject(Box::new(move |cause| {
                    if let Some(on_cause) = on_reject.lock().take() {
                        on_cause(cause);
                    }
                }));
                record.on_stop(Box::new(move || {
                    if let Some(on_cause) = on_stop.lock().take() {
                        on_cause(&PromiseError::Cancelled);
                    }
                }));
                return;
            }
        };
        drop(record);

        match settlement {
            Settlement::Value(value) => on_value(&value),
            Settlement::Cause(cause) => on_cause(&cause),
            Settlement::Stopped => on_cause(&PromiseError::Cancelled),
        }
    }

    #[cfg(test)]
    pub(crate) fn observer_count(&self) -> usize {
        self.shared.record().observer_count()
    }

    /// Unique identifier
    pub fn id(&self) -> PromiseId {
        self.shared.id
    }

    /// Current state
    pub fn state(&self) -> PromiseState {
        self.shared.record().state()
    }

    /// Whether the promise reached a terminal state
    pub fn is_done(&self) -> bool {
        self.state().is_done()
    }

    /// When the promise was created
    pub fn start_time(&self) -> Instant {
        self.shared.started_at
    }

    /// When the promise first reached a terminal state
    pub fn end_time(&self) -> Option<Instant> {
        self.shared.record().ended_at()
    }

    /// Time between creation and settlement, or until now while pending
    pub fn measure_time(&self) -> Duration {
        let end = self.end_time().unwrap_or_else(Instant::now);
        end.saturating_duration_since(self.shared.started_at)
    }

    /// Backend that runs this promise and everything chained from it
    pub fn backend(&self) -> &Backend {
        &self.shared.backend
    }

    /// Resolver bound to this promise
    pub fn resolver(&self) -> Resolver<T> {
        Resolver::new(self.shared.clone())
    }

    /// Stored outcome without waiting; `None` while pending
    pub fn try_value(&self) -> Option<PromiseResult<T>> {
        self.shared.record().settlement().map(Settlement::into_result)
    }

    /// Returns the promise unchanged; lifting a promise is the identity
    pub fn lift(promise: Promise<T>) -> Promise<T> {
        promise
    }

    /// Force `Stopped` and interrupt the execution unit
    ///
    /// No-op once the promise is done. Resolve and reject callbacks are not
    /// fired; awaiters observe [`PromiseError::Cancelled`] and promises
    /// chained from this one are cancelled in turn.
    pub fn cancel(&self) -> Self {
        let callbacks = self.shared.record().stop();
        if let Some(callbacks) = callbacks {
            log::debug!("promise {} cancelled", self.shared.id);
            self.shared.release_unit();
            callbacks.fire(|callback| callback());
        }
        self.clone()
    }

    /// Future resolving with the value, or failing with the cause
    ///
    /// Ready on the first poll when the promise is already done.
    pub fn wait(&self) -> Wait<T> {
        Wait::new(self.settled())
    }

    /// Block the calling thread until the promise is done
    ///
    /// Called from a body on the cooperative backend this holds a worker for
    /// the whole wait; prefer [`wait`](Self::wait) there.
    ///
    /// On a thread-backed body's own thread, cancelling that body releases
    /// the wait with [`PromiseError::Cancelled`].
    pub fn wait_sync(&self) -> PromiseResult<T> {
        match ThreadUnit::current() {
            Some(unit) => unit
                .block_on(self.wait())
                .unwrap_or(Err(PromiseError::Cancelled)),
            None => blocking::block_on(self.wait()),
        }
    }

    /// Block until done, ignoring the outcome
    pub fn join(&self) -> Self {
        if let Err(error) = self.wait_sync() {
            log::trace!("promise {} joined with error: {}", self.shared.id, error);
        }
        self.clone()
    }

    /// Chain a handler on the value
    ///
    /// If this promise is rejected the derived promise never settles; if it
    /// is cancelled the derived promise is cancelled too. A panicking handler
    /// rejects the derived promise.
    pub fn then<R, F>(&self, handler: F) -> Promise<R>
    where
        R: Clone + Send + 'static,
        F: FnOnce(T) -> R + Send + 'static,
    {
        self.then_async(move |value| future::ready(Ok(handler(value))))
    }

    /// Chain a fallible handler on the value; `Err` rejects the derived promise
    pub fn try_then<R, F>(&self, handler: F) -> Promise<R>
    where
        R: Clone + Send + 'static,
        F: FnOnce(T) -> PromiseResult<R> + Send + 'static,
    {
        self.then_async(move |value| future::ready(handler(value)))
    }

    /// Chain an asynchronous handler on the value
    pub fn then_async<R, F, Fut>(&self, handler: F) -> Promise<R>
    where
        R: Clone + Send + 'static,
        F: FnOnce(T) -> Fut + Send + 'static,
        Fut: Future<Output = PromiseResult<R>> + Send + 'static,
    {
        let parent = self.settled();
        self.shared.backend.promise(move |resolver: Resolver<R>| async move {
            match parent.await {
                Settlement::Value(value) => resolver.settle(handler(value).await),
                Settlement::Cause(_) => {}
                Settlement::Stopped => resolver.stop(),
            }
            Ok(())
        })
    }

    /// Chain a handler on the cause
    ///
    /// Mirror of [`then`](Self::then): a completed parent leaves the derived
    /// promise unsettled.
    pub fn catch<R, F>(&self, handler: F) -> Promise<R>
    where
        R: Clone + Send + 'static,
        F: FnOnce(PromiseError) -> R + Send + 'static,
    {
        self.catch_async(move |cause| future::ready(Ok(handler(cause))))
    }

    /// Chain a fallible handler on the cause
    pub fn try_catch<R, F>(&self, handler: F) -> Promise<R>
    where
        R: Clone + Send + 'static,
        F: FnOnce(PromiseError) -> PromiseResult<R> + Send + 'static,
    {
        self.catch_async(move |cause| future::ready(handler(cause)))
    }

    /// Chain an asynchronous handler on the cause
    pub fn catch_async<R, F, Fut>(&self, handler: F) -> Promise<R>
    where
        R: Clone + Send + 'static,
        F: FnOnce(PromiseError) -> Fut + Send + 'static,
        Fut: Future<Output = PromiseResult<R>> + Send + 'static,
    {
        let parent = self.settled();
        self.shared.backend.promise(move |resolver: Resolver<R>| async move {
            match parent.await {
                Settlement::Value(_) => {}
                Settlement::Cause(cause) => resolver.settle(handler(cause).await),
                Settlement::Stopped => resolver.stop(),
            }
            Ok(())
        })
    }

    /// Chain a value handler and an optional cause handler into one promise
    ///
    /// The derived promise mirrors whichever handler ran. Without a cause
    /// handler a rejected parent leaves it unsettled, like [`then`](Self::then).
    pub fn on<R, F, G>(&self, on_value: F, on_cause: Option<G>) -> Promise<R>
    where
        R: Clone + Send + 'static,
        F: FnOnce(T) -> R + Send + 'static,
        G: FnOnce(PromiseError) -> R + Send + 'static,
    {
        let parent = self.settled();
        self.shared.backend.promise(move |resolver: Resolver<R>| async move {
            match parent.await {
                Settlement::Value(value) => resolver.resolve(on_value(value)),
                Settlement::Cause(cause) => {
                    if let Some(on_cause) = on_cause {
                        resolver.resolve(on_cause(cause));
                    }
                }
                Settlement::Stopped => resolver.stop(),
            }
            Ok(())
        })
    }

    /// Run a handler once this promise is done, whatever the outcome
    ///
    /// The derived promise resolves with the handler's result when the parent
    /// completed, rejects with the parent's cause when it was rejected, and is
    /// cancelled when the parent was cancelled.
    pub fn finally<R, F>(&self, handler: F) -> Promise<R>
    where
        R: Clone + Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        self.finally_async(move || future::ready(Ok(handler())))
    }

    /// Asynchronous form of [`finally`](Self::finally)
    pub fn finally_async<R, F, Fut>(&self, handler: F) -> Promise<R>
    where
        R: Clone + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = PromiseResult<R>> + Send + 'static,
    {
        let parent = self.settled();
        self.shared.backend.promise(move |resolver: Resolver<R>| async move {
            let settlement = parent.await;
            let result = handler().await;
            match settlement {
                Settlement::Value(_) => resolver.settle(result),
                Settlement::Cause(cause) => {
                    result?;
                    resolver.reject(cause);
                }
                Settlement::Stopped => {
                    result?;
                    resolver.stop();
                }
            }
            Ok::<(), PromiseError>(())
        })
    }
}

impl<T: Clone + Send + 'static> IntoFuture for Promise<T> {
    type Output = PromiseResult<T>;
    type IntoFuture = Wait<T>;

    fn into_future(self) -> Self::IntoFuture {
        self.wait()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_promise_id_uniqueness() {
        let id1 = PromiseId::new();
        let id2 = PromiseId::new();
        assert_ne!(id1, id2);
        assert!(id2.as_u64() > id1.as_u64());
    }

    #[test]
    fn test_detached_promise_is_idle() {
        let promise: Promise<i32> = Promise::detached(Backend::Thread);
        assert_eq!(promise.state(), PromiseState::Idle);
        assert!(promise.end_time().is_none());
        assert!(promise.try_value().is_none());
    }

    #[test]
    fn test_cancel_idle_promise() {
        let promise: Promise<i32> = Promise::detached(Backend::Thread);
        promise.cancel();

        assert_eq!(promise.state(), PromiseState::Stopped);
        assert!(promise.end_time().is_some());
        assert!(promise.wait_sync().unwrap_err().is_cancelled());
    }

    #[test]
    fn test_cancel_after_settle_is_noop() {
        let promise: Promise<i32> = Promise::detached(Backend::Thread);
        promise.resolver().resolve(3);
        let ended = promise.end_time();

        promise.cancel();

        assert_eq!(promise.state(), PromiseState::Completed);
        assert_eq!(promise.end_time(), ended);
        assert_eq!(promise.wait_sync().unwrap(), 3);
    }

    #[test]
    fn test_measure_time_is_live_while_pending() {
        let promise: Promise<i32> = Promise::detached(Backend::Thread);
        let first = promise.measure_time();
        thread::sleep(Duration::from_millis(5));
        let second = promise.measure_time();
        assert!(second > first);

        promise.resolver().resolve(0);
        let frozen = promise.measure_time();
        thread::sleep(Duration::from_millis(5));
        assert_eq!(promise.measure_time(), frozen);
    }

    #[test]
    fn test_try_value_reports_outcome() {
        let promise: Promise<i32> = Promise::detached(Backend::Thread);
        promise.resolver().reject(PromiseError::msg("no"));

        match promise.try_value() {
            Some(Err(cause)) => assert_eq!(cause.to_string(), "no"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_wait_from_another_thread() {
        let promise: Promise<&'static str> = Promise::detached(Backend::Thread);
        let resolver = promise.resolver();

        let waiter = {
            let promise = promise.clone();
            thread::spawn(move || promise.wait_sync())
        };

        thread::sleep(Duration::from_millis(20));
        resolver.resolve("late");

        assert_eq!(waiter.join().unwrap().unwrap(), "late");
    }
}
