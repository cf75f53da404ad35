//! Error types for result validation

use thiserror::Error;

/// Validation error enumeration
#[derive(Debug, Error, Clone)]
pub enum GateError {
    /// Validation timeout
    #[error("Validation timeout after {0}ms")]
    Timeout(u64),

    /// A signal the check depends on could not be read
    #[error("Missing required signal: {0}")]
    MissingSignal(String),

    /// The action carries data the validator cannot interpret
    #[error("Invalid action: {0}")]
    InvalidAction(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GateError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, GateError::Timeout(_) | GateError::MissingSignal(_))
    }

    /// Get error severity (0=low, 1=medium, 2=high, 3=critical)
    pub fn severity(&self) -> u8 {
        match self {
            GateError::Internal(_) => 3,
            GateError::InvalidAction(_) => 2,
            GateError::Timeout(_) => 1,
            GateError::MissingSignal(_) => 0,
        }
    }
}
