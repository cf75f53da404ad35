use deskpilot_action_flow::ExecutionStatus;
use tracing::debug;

use crate::error::SupervisorError;

/// Task lifecycle: PENDING -> RUNNING <-> PAUSED -> {SUCCESS, FAILED, CANCELLED}.
#[derive(Clone, Debug)]
pub struct Lifecycle {
    state: ExecutionStatus,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            state: ExecutionStatus::Pending,
        }
    }
}

impl Lifecycle {
    pub fn state(&self) -> ExecutionStatus {
        self.state
    }

    pub fn can_transition(&self, to: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        matches!(
            (self.state, to),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Paused)
                | (Paused, Running)
                | (Running, Success | Failed | Cancelled)
                | (Paused, Failed | Cancelled)
        )
    }

    /// Applies `to`; an illegal transition leaves the state unchanged.
    pub fn transition(&mut self, to: ExecutionStatus) -> Result<ExecutionStatus, SupervisorError> {
        if !self.can_transition(to) {
            return Err(SupervisorError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        debug!(from = %self.state, %to, "lifecycle transition");
        let from = self.state;
        self.state = to;
        Ok(from)
    }

    /// Moves to a terminal state, resuming first when paused.
    pub fn finish(&mut self, to: ExecutionStatus) -> Result<ExecutionStatus, SupervisorError> {
        if self.state == ExecutionStatus::Paused && to == ExecutionStatus::Success {
            self.transition(ExecutionStatus::Running)?;
        }
        self.transition(to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ExecutionStatus::*;

    #[test]
    fn happy_path() {
        let mut lifecycle = Lifecycle::default();
        assert_eq!(lifecycle.state(), Pending);
        lifecycle.transition(Running).unwrap();
        lifecycle.transition(Paused).unwrap();
        lifecycle.transition(Running).unwrap();
        lifecycle.transition(Success).unwrap();
        assert_eq!(lifecycle.state(), Success);
    }

    #[test]
    fn illegal_transitions_are_rejected() {
        let mut lifecycle = Lifecycle::default();
        assert_eq!(
            lifecycle.transition(Paused),
            Err(SupervisorError::InvalidTransition {
                from: Pending,
                to: Paused
            })
        );
        lifecycle.transition(Running).unwrap();
        assert!(lifecycle.transition(Running).is_err());
        lifecycle.transition(Cancelled).unwrap();
        for to in [Running, Paused, Success, Failed, Pending] {
            assert!(lifecycle.transition(to).is_err());
        }
        assert_eq!(lifecycle.state(), Cancelled);
    }

    #[test]
    fn finish_from_paused() {
        let mut lifecycle = Lifecycle::default();
        lifecycle.transition(Running).unwrap();
        lifecycle.transition(Paused).unwrap();
        lifecycle.finish(Success).unwrap();
        assert_eq!(lifecycle.state(), Success);
    }
}
