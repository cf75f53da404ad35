//! Core types for action execution

use chrono::{DateTime, Utc};
use deskpilot_action_gate::ValidationReport;
use deskpilot_core_types::{ActionKind, ActionPlan, CaptureHandle, TaskId};
use deskpilot_policy_center::PolicyView;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Status of one action, and of a task as a whole
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Success,
    Failed,
    Cancelled,
    Paused,
}

impl ExecutionStatus {
    /// Get status name
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "PENDING",
            ExecutionStatus::Running => "RUNNING",
            ExecutionStatus::Success => "SUCCESS",
            ExecutionStatus::Failed => "FAILED",
            ExecutionStatus::Cancelled => "CANCELLED",
            ExecutionStatus::Paused => "PAUSED",
        }
    }

    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Success | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings the loop reads once per task
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Retries allowed after the first attempt
    pub retry_budget: u32,

    /// Fixed delay between attempts
    pub retry_delay: Duration,

    /// Take before/after captures around each attempt
    pub capture_enabled: bool,

    /// Pause before the after-capture
    pub settle_delay: Duration,

    /// Run the result validator after a raw success
    pub enable_validation: bool,

    /// Upper bound for one validation
    pub validation_timeout: Duration,
}

impl LoopConfig {
    /// Derive loop settings from a policy view
    pub fn from_policy(policy: &PolicyView) -> Self {
        Self {
            retry_budget: policy.execution.retry_budget(),
            retry_delay: policy.execution.retry_delay(),
            capture_enabled: policy.execution.capture_enabled,
            settle_delay: policy.execution.settle_delay(),
            enable_validation: policy.execution.enable_validation,
            validation_timeout: Duration::from_millis(policy.validation.timeout_ms),
        }
    }

    /// Set retry budget
    pub fn with_retries(mut self, retry_budget: u32, retry_delay: Duration) -> Self {
        self.retry_budget = retry_budget;
        self.retry_delay = retry_delay;
        self
    }

    /// Set validation timeout
    pub fn with_validation_timeout(mut self, timeout: Duration) -> Self {
        self.validation_timeout = timeout;
        self
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            retry_budget: 2,
            retry_delay: Duration::from_millis(1000),
            capture_enabled: true,
            settle_delay: Duration::from_millis(500),
            enable_validation: true,
            validation_timeout: Duration::from_millis(5000),
        }
    }
}

/// Outcome of one action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Index of the action in its plan
    pub action_index: usize,

    /// Action type
    pub action_type: ActionKind,

    /// Action description
    pub description: String,

    /// Final status
    pub status: ExecutionStatus,

    /// Start time
    pub started_at: DateTime<Utc>,

    /// Finish time
    pub finished_at: DateTime<Utc>,

    /// Elapsed time in milliseconds
    pub latency_ms: u64,

    /// Error or note
    pub error: Option<String>,

    /// Capture taken before the last attempt
    pub capture_before: Option<CaptureHandle>,

    /// Capture taken after the last attempt
    pub capture_after: Option<CaptureHandle>,

    /// Retries used beyond the first attempt
    pub retry_count: u32,

    /// Validation report of the last attempt
    pub validation: Option<ValidationReport>,
}

impl ExecutionResult {
    /// Create a running result for an action
    pub fn new(action_index: usize, action: &ActionPlan) -> Self {
        let now = Utc::now();
        Self {
            action_index,
            action_type: action.kind,
            description: action.description.clone(),
            status: ExecutionStatus::Running,
            started_at: now,
            finished_at: now,
            latency_ms: 0,
            error: None,
            capture_before: None,
            capture_after: None,
            retry_count: 0,
            validation: None,
        }
    }

    /// Result for an action that failed before or during dispatch
    pub fn failed(action_index: usize, action: &ActionPlan, error: impl Into<String>) -> Self {
        Self::new(action_index, action)
            .with_status(ExecutionStatus::Failed)
            .with_error(error)
            .finish()
    }

    /// Result for an action that was never dispatched
    pub fn cancelled(action_index: usize, action: &ActionPlan, reason: impl Into<String>) -> Self {
        Self::new(action_index, action)
            .with_status(ExecutionStatus::Cancelled)
            .with_error(reason)
            .finish()
    }

    /// Set status
    pub fn with_status(mut self, status: ExecutionStatus) -> Self {
        self.status = status;
        self
    }

    /// Set error message
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Set finish time and calculate latency
    pub fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self.latency_ms = (self.finished_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }
}

/// Aggregate outcome of a plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExecutionResult {
    /// Task identifier
    pub task_id: TaskId,

    /// Number of actions in the plan
    pub total_actions: usize,

    /// Actions that ended SUCCESS
    pub completed_actions: usize,

    /// completed / total, 0 for an empty plan
    pub success_rate: f64,

    /// Elapsed time in milliseconds
    pub latency_ms: u64,

    /// Overall status
    pub status: ExecutionStatus,

    /// Per-action results in plan order
    pub action_results: Vec<ExecutionResult>,

    /// Retries used per action index, non-zero entries only
    pub retry_counts: BTreeMap<usize, u32>,

    /// Task-level error
    pub final_error: Option<String>,

    /// Start time
    pub started_at: DateTime<Utc>,

    /// Finish time
    pub finished_at: DateTime<Utc>,
}

impl TaskExecutionResult {
    /// Aggregate per-action results
    pub fn from_results(
        task_id: TaskId,
        total_actions: usize,
        action_results: Vec<ExecutionResult>,
        status: ExecutionStatus,
        final_error: Option<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let completed_actions = action_results.iter().filter(|r| r.is_success()).count();
        let success_rate = if total_actions == 0 {
            0.0
        } else {
            completed_actions as f64 / total_actions as f64
        };
        let retry_counts = action_results
            .iter()
            .filter(|r| r.retry_count > 0)
            .map(|r| (r.action_index, r.retry_count))
            .collect();
        let finished_at = Utc::now();

        Self {
            task_id,
            total_actions,
            completed_actions,
            success_rate,
            latency_ms: (finished_at - started_at).num_milliseconds().max(0) as u64,
            status,
            action_results,
            retry_counts,
            final_error,
            started_at,
            finished_at,
        }
    }

    /// Overall status for a run that was not cancelled
    pub fn settle_status(results: &[ExecutionResult], total_actions: usize) -> ExecutionStatus {
        let completed = results.iter().filter(|r| r.is_success()).count();
        if total_actions > 0 && completed == total_actions {
            ExecutionStatus::Success
        } else {
            ExecutionStatus::Failed
        }
    }
}
