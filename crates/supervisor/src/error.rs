use deskpilot_action_flow::ExecutionStatus;
use deskpilot_core_types::DeskError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SupervisorError {
    #[error("a plan is already running")]
    Busy,
    #[error("plan has no actions")]
    EmptyPlan,
    #[error("no plan is running")]
    NotRunning,
    #[error("illegal transition {from} -> {to}")]
    InvalidTransition {
        from: ExecutionStatus,
        to: ExecutionStatus,
    },
    #[error("worker dropped before reporting a result")]
    WorkerLost,
}

impl From<SupervisorError> for DeskError {
    fn from(value: SupervisorError) -> Self {
        DeskError::new(value.to_string())
    }
}
