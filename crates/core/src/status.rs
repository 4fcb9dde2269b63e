//! Video process states and the transition rules between them.
//!
//! ```text
//! PREPARING -> PROCESSING -> COMPLETED
//!     |             |
//!     +-------------+-----> CANCELLED
//! ```
//!
//! `COMPLETED` and `CANCELLED` are terminal.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessState {
    Preparing,
    Processing,
    Completed,
    Cancelled,
}

impl ProcessState {
    /// Numeric status reported to clients.
    pub fn code(self) -> i8 {
        match self {
            Self::Preparing => 0,
            Self::Processing => 1,
            Self::Completed => 2,
            Self::Cancelled => -1,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// States reachable from `self` in one step.
    pub fn valid_transitions(self) -> &'static [ProcessState] {
        match self {
            Self::Preparing => &[Self::Processing, Self::Cancelled],
            Self::Processing => &[Self::Completed, Self::Cancelled],
            Self::Completed | Self::Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, next: ProcessState) -> bool {
        self.valid_transitions().contains(&next)
    }
}

/// Validate that a transition from `current` to `next` is allowed.
pub fn validate_transition(current: ProcessState, next: ProcessState) -> Result<(), CoreError> {
    if current.can_transition_to(next) {
        Ok(())
    } else {
        Err(CoreError::Internal(format!(
            "Cannot transition video from {current:?} to {next:?}. Allowed transitions: {:?}",
            current.valid_transitions()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_is_allowed() {
        assert!(validate_transition(ProcessState::Preparing, ProcessState::Processing).is_ok());
        assert!(validate_transition(ProcessState::Processing, ProcessState::Completed).is_ok());
    }

    #[test]
    fn cancel_allowed_before_completion() {
        assert!(ProcessState::Preparing.can_transition_to(ProcessState::Cancelled));
        assert!(ProcessState::Processing.can_transition_to(ProcessState::Cancelled));
    }

    #[test]
    fn terminal_states_are_final() {
        for terminal in [ProcessState::Completed, ProcessState::Cancelled] {
            assert!(terminal.is_terminal());
            for next in [
                ProcessState::Preparing,
                ProcessState::Processing,
                ProcessState::Completed,
                ProcessState::Cancelled,
            ] {
                assert!(validate_transition(terminal, next).is_err());
            }
        }
    }

    #[test]
    fn cannot_skip_processing() {
        assert!(!ProcessState::Preparing.can_transition_to(ProcessState::Completed));
    }

    #[test]
    fn codes_match_client_contract() {
        assert_eq!(ProcessState::Preparing.code(), 0);
        assert_eq!(ProcessState::Cancelled.code(), -1);
    }
}
