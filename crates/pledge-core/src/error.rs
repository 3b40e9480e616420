//! Error types carried by rejected and cancelled promises

use std::any::Any;
use std::error::Error as StdError;
use std::sync::Arc;

/// Shared, type-erased rejection cause
pub type Cause = Arc<dyn StdError + Send + Sync + 'static>;

/// Reason a promise did not produce a value
///
/// Every variant is cheap to clone: a single rejection may be observed by
/// any number of awaiters and chained handlers.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PromiseError {
    /// Explicit rejection with an arbitrary error value
    #[error("{0}")]
    Rejected(Cause),

    /// Explicit rejection with a plain message
    #[error("{0}")]
    Message(String),

    /// The promise was stopped, or rejected without a cause
    #[error("Promise was cancelled")]
    Cancelled,

    /// Every input of `any` was rejected
    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    /// The body or a handler panicked before settling
    #[error("Promise body panicked: {0}")]
    Panicked(String),

    /// The backend could not run the body
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

impl PromiseError {
    /// Wrap an error value as a rejection cause
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        PromiseError::Rejected(Arc::new(error))
    }

    /// Rejection cause made of a message only
    pub fn msg(message: impl Into<String>) -> Self {
        PromiseError::Message(message.into())
    }

    /// Whether this is the cancellation-kind error
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PromiseError::Cancelled)
    }

    /// Causes collected by `any`, if this is an aggregate failure
    pub fn as_aggregate(&self) -> Option<&AggregateError> {
        match self {
            PromiseError::Aggregate(aggregate) => Some(aggregate),
            _ => None,
        }
    }

    /// Convert a caught panic payload into a rejection cause
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(message) = payload.downcast_ref::<&'static str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "non-string panic payload".to_string()
        };
        PromiseError::Panicked(message)
    }
}

/// Error wrapping the ordered causes of every rejected `any` input
#[derive(Debug, Clone, thiserror::Error)]
#[error("All promises were rejected")]
pub struct AggregateError {
    errors: Vec<PromiseError>,
}

impl AggregateError {
    /// Create an aggregate from causes in arrival order
    pub fn new(errors: Vec<PromiseError>) -> Self {
        Self { errors }
    }

    /// Causes in the order they were observed
    pub fn errors(&self) -> &[PromiseError] {
        &self.errors
    }

    /// Number of causes
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// True when no cause was collected (`any` over zero inputs)
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Errors raised by an execution backend while launching a body
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    /// The worker pool was shut down
    #[error("Scheduler has been shut down")]
    ShutDown,

    /// No worker thread could be started
    #[error("Scheduler has no running workers")]
    NoWorkers,

    /// The OS refused to spawn a thread
    #[error("Failed to spawn thread: {0}")]
    Spawn(String),
}

impl From<std::io::Error> for SchedulerError {
    fn from(error: std::io::Error) -> Self {
        SchedulerError::Spawn(error.to_string())
    }
}

/// Outcome type of bodies and fallible handlers
pub type PromiseResult<T> = Result<T, PromiseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("disk on fire")]
    struct DiskError;

    #[test]
    fn test_wrapped_error_display() {
        let error = PromiseError::new(DiskError);
        assert_eq!(error.to_string(), "disk on fire");
        assert!(!error.is_cancelled());
    }

    #[test]
    fn test_aggregate_conversion() {
        let aggregate = AggregateError::new(vec![PromiseError::msg("a"), PromiseError::Cancelled]);
        let error: PromiseError = aggregate.into();
        assert_eq!(error.to_string(), "All promises were rejected");

        let aggregate = error.as_aggregate().expect("aggregate");
        assert_eq!(aggregate.len(), 2);
        assert!(aggregate.errors()[1].is_cancelled());
    }

    #[test]
    fn test_panic_payloads() {
        let error = PromiseError::from_panic(Box::new("boom"));
        assert!(matches!(error, PromiseError::Panicked(ref m) if m == "boom"));

        let error = PromiseError::from_panic(Box::new(String::from("owned")));
        assert!(matches!(error, PromiseError::Panicked(ref m) if m == "owned"));

        let error = PromiseError::from_panic(Box::new(7u8));
        assert!(matches!(error, PromiseError::Panicked(_)));
    }

    #[test]
    fn test_scheduler_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "no threads left");
        let error: PromiseError = SchedulerError::from(io).into();
        assert_eq!(error.to_string(), "Failed to spawn thread: no threads left");
    }
}
