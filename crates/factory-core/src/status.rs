//! Lifecycle state of a batch invocation.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// State of one streamed Driver invocation.
///
/// `Starting -> Running -> Ended`, or `Starting/Running -> Aborted` when the
/// observer goes away first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvocationState {
    /// Request accepted, `start` not yet delivered or child not yet spawned.
    #[default]
    Starting,
    /// Child spawned, output is being relayed.
    Running,
    /// A terminal event (`end` or `error`) was delivered.
    Ended,
    /// Observer disconnected before a terminal event.
    Aborted,
}

impl InvocationState {
    /// Returns true if no further events may be written.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended | Self::Aborted)
    }

    /// Move to `next`, rejecting transitions out of a terminal state.
    pub fn transition(self, next: InvocationState) -> Result<InvocationState, CoreError> {
        let allowed = match (self, next) {
            (Self::Starting, Self::Running) => true,
            (Self::Starting | Self::Running, Self::Ended | Self::Aborted) => true,
            _ => false,
        };

        if allowed {
            Ok(next)
        } else {
            Err(CoreError::InvalidStateTransition {
                from: format!("{:?}", self),
                to: format!("{:?}", next),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let state = InvocationState::default();
        let state = state.transition(InvocationState::Running).unwrap();
        let state = state.transition(InvocationState::Ended).unwrap();
        assert!(state.is_terminal());
    }

    #[test]
    fn test_abort_before_running() {
        let state = InvocationState::Starting
            .transition(InvocationState::Aborted)
            .unwrap();
        assert_eq!(state, InvocationState::Aborted);
    }

    #[test]
    fn test_terminal_states_are_final() {
        assert!(InvocationState::Ended
            .transition(InvocationState::Aborted)
            .is_err());
        assert!(InvocationState::Aborted
            .transition(InvocationState::Running)
            .is_err());
        assert!(InvocationState::Running
            .transition(InvocationState::Starting)
            .is_err());
    }
}
