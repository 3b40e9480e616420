//! Pledge: promises for Rust
//!
//! This crate provides a promise primitive with:
//! - Settle-once resolvers usable from any thread
//! - Chaining (`then`, `catch`, `on`, `finally`) and awaiting
//! - Cancellation that propagates to chained promises
//! - Aggregates (`all`, `any`, `race`) and timers (`delay`, `sleep`)
//! - Two backends: a cooperative worker pool and one OS thread per promise
//!
//! ```no_run
//! use pledge_core::{Backend, Resolver};
//!
//! let doubled = Backend::Thread
//!     .promise(|resolver: Resolver<i32>| async move {
//!         resolver.resolve(21);
//!         Ok(())
//!     })
//!     .then(|value| value * 2);
//!
//! assert_eq!(doubled.wait_sync().unwrap(), 42);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod backend;
mod blocking;
mod body;
mod combinators;
pub mod error;
pub mod promise;
mod record;
pub mod resolver;
pub mod scheduler;
mod settle;
pub mod state;
mod thread;
pub mod timer;

pub use backend::Backend;
pub use blocking::block_on;
pub use combinators::{promise, promise_void};
pub use error::{AggregateError, Cause, PromiseError, PromiseResult, SchedulerError};
pub use promise::{Promise, PromiseId};
pub use resolver::Resolver;
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerStats};
pub use settle::Wait;
pub use state::PromiseState;
pub use timer::{sleep, Sleep};
