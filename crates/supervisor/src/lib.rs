//! Execution supervisor for DeskPilot plans.
//!
//! [`ExecutionEngine`] owns the task lifecycle: it assesses each action,
//! holds risky ones at the [`ConfirmationGate`], hands approved ones to the
//! action runner and aggregates a [`TaskExecutionResult`].
//!
//! [`TaskExecutionResult`]: deskpilot_action_flow::TaskExecutionResult

pub mod completion;
pub mod engine;
pub mod error;
pub mod events;
pub mod gate;
pub mod metrics;
pub mod mode;
pub mod model;
pub mod state;


pub use completion::{build_prompt, parse_verdict, CompletionStatus, CompletionVerdict};
pub use engine::{EngineBuilder, ExecutionEngine};
pub use error::SupervisorError;
pub use events::SupervisorEvent;
pub use gate::{ConfirmationGate, GateDecision};
pub use metrics::{SupervisorMetrics, SupervisorMetricsSnapshot};
pub use mode::needs_confirmation;
pub use model::{PlanRequest, RunHandle, StatusSnapshot};
pub use state::Lifecycle;
