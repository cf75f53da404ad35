//! Action Execution Loop
//!
//! This module dispatches one planned desktop action at a time to an external
//! executor, wraps each attempt with before/after captures and result
//! validation, and retries failed attempts with a fixed delay.

pub mod errors;
pub mod executor;
pub mod keymap;
pub mod strategies;
pub mod types;

pub use errors::FlowError;
pub use executor::{check_payload, ActionExecutor, ActionRunner, AttemptObserver, CaptureProvider};
pub use keymap::Platform;
pub use strategies::{RetryDecision, RetryPolicy};
pub use types::{ExecutionResult, ExecutionStatus, LoopConfig, TaskExecutionResult};
