use crate::error::{OrchestratorError, Result};

/// Lifecycle of a single phase poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Polling,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

impl PollerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Polling => "polling",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        PollerStateMachine::allowed_transitions(self).is_empty()
    }
}

pub struct PollerStateMachine;

impl PollerStateMachine {
    pub fn validate_transition(from: &PollerState, to: &PollerState) -> Result<()> {
        if Self::allowed_transitions(from).contains(to) {
            Ok(())
        } else {
            Err(OrchestratorError::InvalidTransition {
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
            })
        }
    }

    fn allowed_transitions(from: &PollerState) -> Vec<PollerState> {
        match from {
            PollerState::Idle => vec![PollerState::Polling, PollerState::Cancelled],
            PollerState::Polling => vec![
                PollerState::Polling,
                PollerState::Succeeded,
                PollerState::Failed,
                PollerState::TimedOut,
                PollerState::Cancelled,
            ],
            PollerState::Succeeded
            | PollerState::Failed
            | PollerState::TimedOut
            | PollerState::Cancelled => vec![],
        }
    }

    pub fn can_transition(from: &PollerState, to: &PollerState) -> bool {
        Self::validate_transition(from, to).is_ok()
    }
}
