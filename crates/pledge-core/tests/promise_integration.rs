//! Integration tests for promises on the default backend

use pledge_core::{
    promise, promise_void, sleep, Promise, PromiseError, PromiseState, Resolver,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn failing_after(millis: u64, message: &'static str) -> Promise<i32> {
    promise(move |_resolver: Resolver<i32>| async move {
        sleep(Duration::from_millis(millis)).await;
        Err(PromiseError::msg(message))
    })
}

#[test]
fn test_resolve_then_increment() {
    init_logger();
    let six = Promise::resolved(5).then(|value| value + 1);
    assert_eq!(six.wait_sync().unwrap(), 6);
}

#[test]
fn test_settle_once_from_body() {
    let p = promise(|resolver: Resolver<i32>| async move {
        resolver.resolve(1);
        resolver.resolve(2);
        resolver.reject(PromiseError::msg("ignored"));
        Ok(())
    });

    assert_eq!(p.wait_sync().unwrap(), 1);
    assert_eq!(p.state(), PromiseState::Completed);
}

#[test]
fn test_body_error_rejects() {
    let p = promise(|_resolver: Resolver<i32>| async move { Err(PromiseError::msg("bad input")) });

    let cause = p.wait_sync().unwrap_err();
    assert_eq!(cause.to_string(), "bad input");
    assert_eq!(p.state(), PromiseState::Rejected);
}

#[test]
fn test_body_panic_rejects() {
    let p = promise(|resolver: Resolver<i32>| async move {
        let values: Vec<i32> = Vec::new();
        resolver.resolve(values[3]);
        Ok(())
    });

    assert!(matches!(p.wait_sync(), Err(PromiseError::Panicked(_))));
}

#[test]
fn test_handler_panic_rejects_derived() {
    let derived = Promise::resolved(1).then(|value: i32| -> i32 {
        if value == 1 {
            panic!("handler failed");
        }
        value
    });

    match derived.wait_sync() {
        Err(PromiseError::Panicked(message)) => assert_eq!(message, "handler failed"),
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[test]
fn test_catch_recovers() {
    let recovered = Promise::<i32>::rejected(PromiseError::msg("oops"))
        .catch(|cause| cause.to_string().len());
    assert_eq!(recovered.wait_sync().unwrap(), 4);
}

#[test]
fn test_try_then_rejects_on_err() {
    let derived = Promise::resolved(2).try_then(|value: i32| -> Result<i32, PromiseError> {
        if value % 2 == 0 {
            Err(PromiseError::msg("even"))
        } else {
            Ok(value)
        }
    });
    assert_eq!(derived.wait_sync().unwrap_err().to_string(), "even");
}

#[test]
fn test_then_async_awaits_other_promises() {
    let sum = Promise::resolved(10).then_async(|value| async move {
        let extra = Promise::delay_with(Duration::from_millis(5), || 5).await?;
        Ok::<_, PromiseError>(value + extra)
    });
    assert_eq!(sum.wait_sync().unwrap(), 15);
}

#[test]
fn test_then_on_rejected_parent_stays_pending() {
    let parent: Promise<i32> = Promise::rejected(PromiseError::msg("nope"));
    let derived = parent.then(|value| value * 2);

    thread::sleep(Duration::from_millis(30));
    assert!(!derived.is_done());
}

#[test]
fn test_on_picks_matching_handler() {
    let ok = Promise::resolved(3).on(|v| v * 10, Some(|_cause: PromiseError| -1));
    let err = Promise::<i32>::rejected(PromiseError::msg("x")).on(|v| v * 10, Some(|_cause: PromiseError| -1));

    assert_eq!(ok.wait_sync().unwrap(), 30);
    assert_eq!(err.wait_sync().unwrap(), -1);
}

#[test]
fn test_finally_runs_for_every_outcome() {
    let runs = Arc::new(AtomicUsize::new(0));

    let counter = runs.clone();
    let after_ok = Promise::resolved(1).finally(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        "cleaned"
    });
    assert_eq!(after_ok.wait_sync().unwrap(), "cleaned");

    let counter = runs.clone();
    let after_err = Promise::<i32>::rejected(PromiseError::msg("kept")).finally(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(after_err.wait_sync().unwrap_err().to_string(), "kept");

    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[test]
fn test_every_dependent_runs_once() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let resolver = Promise::<i32>::with_resolvers();
    let source = resolver.promise();

    let derived: Vec<Promise<()>> = (0..5)
        .map(|index| {
            let seen = seen.clone();
            source.then(move |_| seen.lock().unwrap().push(index))
        })
        .collect();

    // Let every derived body reach its await before settling
    thread::sleep(Duration::from_millis(30));
    resolver.resolve(0);

    Promise::all(derived).wait_sync().unwrap();

    let mut seen = seen.lock().unwrap().clone();
    seen.sort();
    assert_eq!(seen, vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_all_resolves_in_input_order() {
    let all = Promise::all(vec![
        Promise::delay_with(Duration::from_millis(30), || "a"),
        Promise::resolved("b"),
        Promise::delay_with(Duration::from_millis(10), || "c"),
    ]);
    assert_eq!(all.wait_sync().unwrap(), vec!["a", "b", "c"]);
}

#[test]
fn test_all_fails_fast() {
    let start = Instant::now();
    let slow = Promise::delay_with(Duration::from_millis(50), || 1);
    let all = Promise::all(vec![slow, Promise::rejected(PromiseError::msg("first"))]);

    assert_eq!(all.wait_sync().unwrap_err().to_string(), "first");
    assert!(start.elapsed() < Duration::from_millis(50));
}

#[test]
fn test_race_first_settlement_wins() {
    let start = Instant::now();
    let race = Promise::race(vec![
        Promise::delay_with(Duration::from_millis(50), || 1),
        failing_after(10, "quick"),
    ]);

    assert_eq!(race.wait_sync().unwrap_err().to_string(), "quick");
    assert!(start.elapsed() < Duration::from_millis(50));
}

#[test]
fn test_any_aggregates_two_causes() {
    let any = Promise::any(vec![failing_after(30, "second"), failing_after(5, "first")]);

    let cause = any.wait_sync().unwrap_err();
    let causes: Vec<String> = cause
        .as_aggregate()
        .expect("aggregate")
        .errors()
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(causes, vec!["first", "second"]);
}

#[test]
fn test_any_of_nothing_rejects() {
    let any = Promise::<i32>::any(Vec::new());
    let cause = any.wait_sync().unwrap_err();
    assert!(cause.as_aggregate().unwrap().is_empty());
}

#[test]
fn test_cancel_is_terminal() {
    let resolver = Promise::<i32>::with_resolvers();
    let p = resolver.promise();

    p.cancel();
    assert_eq!(p.state(), PromiseState::Stopped);
    let ended = p.end_time();

    resolver.resolve(1);
    p.cancel();

    assert_eq!(p.state(), PromiseState::Stopped);
    assert_eq!(p.end_time(), ended);
    assert!(p.wait_sync().unwrap_err().is_cancelled());
}

#[test]
fn test_cancel_stops_running_body() {
    let reached = Arc::new(AtomicUsize::new(0));
    let flag = reached.clone();
    let p = promise_void(move |resolver| async move {
        sleep(Duration::from_millis(200)).await;
        flag.fetch_add(1, Ordering::SeqCst);
        resolver.done();
        Ok(())
    });

    thread::sleep(Duration::from_millis(50));
    assert!(!p.is_done());
    p.cancel();

    thread::sleep(Duration::from_millis(300));
    assert_eq!(reached.load(Ordering::SeqCst), 0);
    assert_eq!(p.state(), PromiseState::Stopped);
}

#[test]
fn test_cancel_propagates_to_chain() {
    let resolver = Promise::<i32>::with_resolvers();
    let parent = resolver.promise();
    let child = parent.then(|v| v + 1);
    let grandchild = child.then(|v| v + 1);

    parent.cancel();

    assert!(grandchild.wait_sync().unwrap_err().is_cancelled());
    assert_eq!(child.state(), PromiseState::Stopped);
    assert_eq!(grandchild.state(), PromiseState::Stopped);
}

#[test]
fn test_timing_is_monotonic() {
    let p = Promise::delay(Duration::from_millis(20));
    let start = p.start_time();
    p.join();

    let end = p.end_time().expect("settled");
    assert!(end >= start);
    assert!(p.measure_time() >= Duration::from_millis(20));
    assert_eq!(p.measure_time(), end - start);
}

#[test]
fn test_await_in_async_context() {
    let outer = promise(|resolver: Resolver<String>| async move {
        let first = Promise::delay_with(Duration::from_millis(5), || "left".to_string());
        let second = Promise::resolved("right".to_string());
        let joined = format!("{}-{}", first.await?, second.await?);
        resolver.resolve(joined);
        Ok::<(), PromiseError>(())
    });
    assert_eq!(outer.wait_sync().unwrap(), "left-right");
}

#[test]
fn test_lift_is_identity() {
    let p = Promise::resolved(8);
    let lifted = Promise::lift(p.clone());
    assert_eq!(lifted.id(), p.id());
}
