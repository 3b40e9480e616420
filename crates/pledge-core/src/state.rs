//! Promise state machine states

use std::fmt;

/// State of a Promise
///
/// `Idle → Running → Completed | Rejected`, with `Stopped` reachable from
/// either non-terminal state through `cancel()`. Terminal states never change.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PromiseState {
    /// Created, body not started yet
    Idle,
    /// Body is executing
    Running,
    /// Settled with a value
    Completed,
    /// Settled with a cause
    Rejected,
    /// Cancelled; carries neither value nor cause
    Stopped,
}

impl PromiseState {
    /// Whether this state is terminal
    pub fn is_done(self) -> bool {
        matches!(
            self,
            PromiseState::Completed | PromiseState::Rejected | PromiseState::Stopped
        )
    }
}

impl fmt::Display for PromiseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PromiseState::Idle => "idle",
            PromiseState::Running => "running",
            PromiseState::Completed => "completed",
            PromiseState::Rejected => "rejected",
            PromiseState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_done_states() {
        assert!(!PromiseState::Idle.is_done());
        assert!(!PromiseState::Running.is_done());
        assert!(PromiseState::Completed.is_done());
        assert!(PromiseState::Rejected.is_done());
        assert!(PromiseState::Stopped.is_done());
    }

    #[test]
    fn test_display() {
        assert_eq!(PromiseState::Stopped.to_string(), "stopped");
    }
}
