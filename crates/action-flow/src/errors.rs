//! Action execution error types

use deskpilot_action_gate::GateError;
use deskpilot_core_types::DeskError;
use thiserror::Error;

/// Action execution errors
#[derive(Debug, Error, Clone)]
pub enum FlowError {
    /// Target could not be resolved to a screen position
    #[error("Could not resolve target: {0}")]
    Resolution(String),

    /// Action payload is missing a required field
    #[error("Invalid action payload: {0}")]
    InvalidPayload(String),

    /// Executor reported an error
    #[error("Executor error: {0}")]
    Executor(String),

    /// Result validation error
    #[error("Validation error: {0}")]
    Validation(#[from] GateError),

    /// Execution was cancelled
    #[error("Execution cancelled")]
    Cancelled,
}

impl FlowError {
    /// Deterministic errors are never retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, FlowError::Executor(_) | FlowError::Validation(_))
    }
}

impl From<DeskError> for FlowError {
    fn from(err: DeskError) -> Self {
        FlowError::Resolution(err.to_string())
    }
}

impl From<FlowError> for DeskError {
    fn from(err: FlowError) -> Self {
        DeskError::new(err.to_string())
    }
}
