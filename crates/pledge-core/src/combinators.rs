//! Promise constructors and aggregate combinators
//!
//! Every combinator is available on [`Backend`] and, with the default
//! backend, as an associated function of [`Promise`]. Aggregates subscribe a
//! value/cause pair on each input; the output carries no execution unit of
//! its own. A cancelled input counts as a rejection with
//! [`PromiseError::Cancelled`].

use crate::backend::Backend;
use crate::error::{AggregateError, PromiseError, PromiseResult};
use crate::promise::Promise;
use crate::resolver::Resolver;
use crate::timer;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Values collected by `all`, indexed by input position
struct Gather<T> {
    values: Vec<Option<T>>,
    remaining: usize,
}

impl Backend {
    /// Promise resolving with `()` after `duration`
    pub fn delay(&self, duration: Duration) -> Promise<()> {
        self.delay_with(duration, || ())
    }

    /// Promise resolving with `produce()` after `duration`
    pub fn delay_with<T, F>(&self, duration: Duration, produce: F) -> Promise<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        self.promise(move |resolver: Resolver<T>| async move {
            timer::sleep(duration).await;
            resolver.resolve(produce());
            Ok(())
        })
    }

    /// Resolver bound to a fresh idle promise with no body
    pub fn with_resolvers<T: Clone + Send + 'static>(&self) -> Resolver<T> {
        Promise::detached(self.clone()).resolver()
    }

    /// Promise already completed with `value`
    pub fn resolved<T: Clone + Send + 'static>(&self, value: T) -> Promise<T> {
        let resolver = self.with_resolvers();
        resolver.resolve(value);
        resolver.promise()
    }

    /// Promise already rejected with `cause`
    pub fn rejected<T: Clone + Send + 'static>(&self, cause: PromiseError) -> Promise<T> {
        let resolver = self.with_resolvers();
        resolver.reject(cause);
        resolver.promise()
    }

    /// Values of every input, in input order
    ///
    /// Rejects with the first cause to arrive. An empty input resolves
    /// immediately with an empty vector.
    pub fn all<T, I>(&self, promises: I) -> Promise<Vec<T>>
    where
        T: Clone + Send + 'static,
        I: IntoIterator<Item = Promise<T>>,
    {
        let promises: Vec<Promise<T>> = promises.into_iter().collect();
        let output = Promise::detached(self.clone());
        let resolver = output.resolver();

        let count = promises.len();
        if count == 0 {
            resolver.resolve(Vec::new());
            return output;
        }
        output.mark_running();

        let gather = Arc::new(Mutex::new(Gather {
            values: vec![None; count],
            remaining: count,
        }));

        for (index, promise) in promises.iter().enumerate() {
            let gather = gather.clone();
            let on_value = resolver.clone();
            let on_cause = resolver.clone();
            promise.subscribe(
                move |value: &T| {
                    let values: Option<Vec<T>> = {
                        let mut gather = gather.lock();
                        if gather.values[index].is_none() {
                            gather.values[index] = Some(value.clone());
                            gather.remaining -= 1;
                        }
                        if gather.remaining > 0 {
                            return;
                        }
                        gather.values.iter_mut().map(Option::take).collect()
                    };
                    if let Some(values) = values {
                        on_value.resolve(values);
                    }
                },
                move |cause: &PromiseError| on_cause.reject(cause.clone()),
            );
        }

        output
    }

    /// First input value to arrive
    ///
    /// Rejects with an [`AggregateError`] holding every cause, in arrival
    /// order, once all inputs rejected. An empty input rejects immediately
    /// with an empty aggregate.
    pub fn any<T, I>(&self, promises: I) -> Promise<T>
    where
        T: Clone + Send + 'static,
        I: IntoIterator<Item = Promise<T>>,
    {
        let promises: Vec<Promise<T>> = promises.into_iter().collect();
        let output = Promise::detached(self.clone());
        let resolver = output.resolver();

        let count = promises.len();
        if count == 0 {
            resolver.reject(AggregateError::new(Vec::new()).into());
            return output;
        }
        output.mark_running();

        let causes = Arc::new(Mutex::new(Vec::with_capacity(count)));

        for promise in &promises {
            let causes = causes.clone();
            let on_value = resolver.clone();
            let on_cause = resolver.clone();
            promise.subscribe(
                move |value: &T| on_value.resolve(value.clone()),
                move |cause: &PromiseError| {
                    let aggregate = {
                        let mut causes = causes.lock();
                        causes.push(cause.clone());
                        if causes.len() < count {
                            return;
                        }
                        AggregateError::new(causes.clone())
                    };
                    on_cause.reject(aggregate.into());
                },
            );
        }

        output
    }

    /// First input to settle, whichever way it settles
    ///
    /// An empty input never settles.
    pub fn race<T, I>(&self, promises: I) -> Promise<T>
    where
        T: Clone + Send + 'static,
        I: IntoIterator<Item = Promise<T>>,
    {
        let output = Promise::detached(self.clone());
        let resolver = output.resolver();

        for promise in promises {
            output.mark_running();
            let on_value = resolver.clone();
            let on_cause = resolver.clone();
            promise.subscribe(
                move |value: &T| on_value.resolve(value.clone()),
                move |cause: &PromiseError| on_cause.reject(cause.clone()),
            );
        }

        output
    }
}

/// Backend for an aggregate: the first input's, else the default
fn inherited<T: Clone + Send + 'static>(promises: &[Promise<T>]) -> Backend {
    promises
        .first()
        .map(|promise| promise.backend().clone())
        .unwrap_or_default()
}

impl Promise<()> {
    /// Promise resolving after `duration` on the default backend
    pub fn delay(duration: Duration) -> Promise<()> {
        Backend::default().delay(duration)
    }
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// [`Backend::delay_with`] on the default backend
    pub fn delay_with<F>(duration: Duration, produce: F) -> Promise<T>
    where
        F: FnOnce() -> T + Send + 'static,
    {
        Backend::default().delay_with(duration, produce)
    }

    /// [`Backend::with_resolvers`] on the default backend
    pub fn with_resolvers() -> Resolver<T> {
        Backend::default().with_resolvers()
    }

    /// [`Backend::resolved`] on the default backend
    pub fn resolved(value: T) -> Promise<T> {
        Backend::default().resolved(value)
    }

    /// [`Backend::rejected`] on the default backend
    pub fn rejected(cause: PromiseError) -> Promise<T> {
        Backend::default().rejected(cause)
    }

    /// [`Backend::all`] on the first input's backend
    pub fn all<I>(promises: I) -> Promise<Vec<T>>
    where
        I: IntoIterator<Item = Promise<T>>,
    {
        let promises: Vec<Promise<T>> = promises.into_iter().collect();
        inherited(&promises).all(promises)
    }

    /// [`Backend::any`] on the first input's backend
    pub fn any<I>(promises: I) -> Promise<T>
    where
        I: IntoIterator<Item = Promise<T>>,
    {
        let promises: Vec<Promise<T>> = promises.into_iter().collect();
        inherited(&promises).any(promises)
    }

    /// [`Backend::race`] on the first input's backend
    pub fn race<I>(promises: I) -> Promise<T>
    where
        I: IntoIterator<Item = Promise<T>>,
    {
        let promises: Vec<Promise<T>> = promises.into_iter().collect();
        inherited(&promises).race(promises)
    }
}

/// Start `body` on the default backend
pub fn promise<T, F, Fut>(body: F) -> Promise<T>
where
    T: Clone + Send + 'static,
    F: FnOnce(Resolver<T>) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = PromiseResult<()>> + Send + 'static,
{
    Backend::default().promise(body)
}

/// Start a unit-valued `body` on the default backend
pub fn promise_void<F, Fut>(body: F) -> Promise<()>
where
    F: FnOnce(Resolver<()>) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = PromiseResult<()>> + Send + 'static,
{
    promise(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PromiseState;
    use std::time::Instant;

    fn thread_delay(millis: u64, value: i32) -> Promise<i32> {
        Backend::Thread.delay_with(Duration::from_millis(millis), move || value)
    }

    fn thread_failure(millis: u64, message: &'static str) -> Promise<i32> {
        Backend::Thread.promise(move |_r: Resolver<i32>| async move {
            timer::sleep(Duration::from_millis(millis)).await;
            Err(PromiseError::msg(message))
        })
    }

    #[test]
    fn test_resolved_and_rejected() {
        let ok = Backend::Thread.resolved(5);
        assert_eq!(ok.state(), PromiseState::Completed);
        assert_eq!(ok.wait_sync().unwrap(), 5);

        let err: Promise<i32> = Backend::Thread.rejected(PromiseError::msg("no"));
        assert_eq!(err.state(), PromiseState::Rejected);
        assert_eq!(err.wait_sync().unwrap_err().to_string(), "no");
    }

    #[test]
    fn test_with_resolvers_is_idle() {
        let resolver = Backend::Thread.with_resolvers::<u8>();
        assert_eq!(resolver.promise().state(), PromiseState::Idle);
    }

    #[test]
    fn test_delay_waits() {
        let start = Instant::now();
        Backend::Thread.delay(Duration::from_millis(20)).wait_sync().unwrap();
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_all_keeps_input_order() {
        let all = Backend::Thread.all(vec![
            thread_delay(30, 1),
            thread_delay(5, 2),
            thread_delay(15, 3),
        ]);
        assert_eq!(all.wait_sync().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_all_empty_resolves() {
        let all = Backend::Thread.all(Vec::<Promise<i32>>::new());
        assert_eq!(all.state(), PromiseState::Completed);
        assert!(all.wait_sync().unwrap().is_empty());
    }

    #[test]
    fn test_all_fails_fast() {
        let start = Instant::now();
        let all = Backend::Thread.all(vec![thread_delay(300, 1), thread_failure(5, "first")]);

        assert_eq!(all.wait_sync().unwrap_err().to_string(), "first");
        assert!(start.elapsed() < Duration::from_millis(300));
    }

    #[test]
    fn test_any_first_value_wins() {
        let any = Backend::Thread.any(vec![thread_failure(5, "a"), thread_delay(20, 7)]);
        assert_eq!(any.wait_sync().unwrap(), 7);
    }

    #[test]
    fn test_any_aggregates_in_arrival_order() {
        let any = Backend::Thread.any(vec![
            thread_failure(40, "slow"),
            thread_failure(5, "fast"),
        ]);

        let cause = any.wait_sync().unwrap_err();
        let aggregate = cause.as_aggregate().expect("aggregate cause");
        let messages: Vec<String> = aggregate.errors().iter().map(|e| e.to_string()).collect();
        assert_eq!(messages, vec!["fast", "slow"]);
        assert_eq!(cause.to_string(), "All promises were rejected");
    }

    #[test]
    fn test_any_empty_rejects() {
        let any = Backend::Thread.any(Vec::<Promise<i32>>::new());
        let cause = any.wait_sync().unwrap_err();
        assert!(cause.as_aggregate().map(AggregateError::is_empty).unwrap_or(false));
    }

    #[test]
    fn test_race_takes_first_rejection() {
        let race = Backend::Thread.race(vec![thread_delay(60, 1), thread_failure(5, "quick")]);
        assert_eq!(race.wait_sync().unwrap_err().to_string(), "quick");
    }

    #[test]
    fn test_race_empty_stays_pending() {
        let race = Backend::Thread.race(Vec::<Promise<i32>>::new());
        assert_eq!(race.state(), PromiseState::Idle);
    }

    #[test]
    fn test_cancelled_input_fails_all() {
        let resolver = Backend::Thread.with_resolvers::<i32>();
        let all = Backend::Thread.all(vec![resolver.promise()]);

        resolver.promise().cancel();
        assert!(all.wait_sync().unwrap_err().is_cancelled());
    }

    #[test]
    fn test_promise_level_combinators_inherit_backend() {
        let all = Promise::all(vec![Backend::Thread.resolved(1), Backend::Thread.resolved(2)]);
        assert!(!all.backend().is_cooperative());
        assert_eq!(all.wait_sync().unwrap(), vec![1, 2]);
    }
}
