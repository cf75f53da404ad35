use deskpilot_action_flow::{ExecutionResult, ExecutionStatus, TaskExecutionResult};
use deskpilot_core_types::{ActionKind, TaskId};
use deskpilot_safety_broker::RiskLevel;
use serde::Serialize;

use crate::model::StatusSnapshot;

/// Lifecycle events published on the engine bus. Delivery is best effort.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SupervisorEvent {
    Started {
        task_id: TaskId,
        total_actions: usize,
    },
    ActionStarted {
        task_id: TaskId,
        action_index: usize,
        description: String,
        attempt: u32,
    },
    ActionCompleted {
        task_id: TaskId,
        result: ExecutionResult,
    },
    ConfirmationRequested {
        task_id: TaskId,
        action_index: usize,
        action_type: ActionKind,
        risk_level: RiskLevel,
        message: String,
    },
    Paused {
        task_id: TaskId,
    },
    Resumed {
        task_id: TaskId,
    },
    Stopped {
        task_id: TaskId,
    },
    Completed {
        task_id: TaskId,
        status: ExecutionStatus,
        result: Box<TaskExecutionResult>,
    },
    Error {
        task_id: TaskId,
        action_index: Option<usize>,
        message: String,
    },
    Status(Box<StatusSnapshot>),
    CompletionCheckRequested {
        task_id: TaskId,
        original_command: String,
        previous_output: Option<String>,
        prompt: String,
    },
}

impl SupervisorEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SupervisorEvent::Started { .. } => "started",
            SupervisorEvent::ActionStarted { .. } => "action_started",
            SupervisorEvent::ActionCompleted { .. } => "action_completed",
            SupervisorEvent::ConfirmationRequested { .. } => "confirmation_requested",
            SupervisorEvent::Paused { .. } => "paused",
            SupervisorEvent::Resumed { .. } => "resumed",
            SupervisorEvent::Stopped { .. } => "stopped",
            SupervisorEvent::Completed { .. } => "completed",
            SupervisorEvent::Error { .. } => "error",
            SupervisorEvent::Status(_) => "status",
            SupervisorEvent::CompletionCheckRequested { .. } => "completion_check_requested",
        }
    }
}
