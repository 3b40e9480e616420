//! Wrapping of a user body into the future an execution unit drives

use crate::error::{PromiseError, PromiseResult};
use crate::resolver::Resolver;
use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context, Poll};

/// Type-erased body future owned by a task or a dedicated thread
pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Future adapter turning a panic inside `poll` into an `Err` payload
pub(crate) struct CatchPanic<F> {
    inner: Pin<Box<F>>,
}

impl<F: Future> CatchPanic<F> {
    pub(crate) fn new(inner: F) -> Self {
        Self {
            inner: Box::pin(inner),
        }
    }
}

impl<F: Future> Future for CatchPanic<F> {
    type Output = Result<F::Output, Box<dyn Any + Send>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let inner = self.inner.as_mut();
        match panic::catch_unwind(AssertUnwindSafe(|| inner.poll(cx))) {
            Ok(Poll::Pending) => Poll::Pending,
            Ok(Poll::Ready(output)) => Poll::Ready(Ok(output)),
            Err(payload) => Poll::Ready(Err(payload)),
        }
    }
}

/// Build the future that runs `body` for the promise behind `resolver`
///
/// The promise moves to `Running` on the first poll. An `Err` from the body,
/// or a panic while it runs, rejects the promise unless it already settled.
/// A promise cancelled before its unit started never runs the body.
pub(crate) fn execute<T, F, Fut>(resolver: Resolver<T>, body: F) -> BoxFuture
where
    T: Clone + Send + 'static,
    F: FnOnce(Resolver<T>) -> Fut + Send + 'static,
    Fut: Future<Output = PromiseResult<()>> + Send + 'static,
{
    Box::pin(async move {
        let promise = resolver.promise();
        if promise.is_done() {
            return;
        }
        promise.mark_running();

        let handle = resolver.clone();
        let outcome = CatchPanic::new(async move { body(handle).await }).await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(cause)) => resolver.reject(cause),
            Err(payload) => {
                let cause = PromiseError::from_panic(payload);
                log::warn!("promise {} body panicked: {}", promise.id(), cause);
                resolver.reject(cause);
            }
        }
    })
}
