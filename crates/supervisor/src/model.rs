use std::sync::Arc;

use deskpilot_action_flow::{ExecutionStatus, TaskExecutionResult};
use deskpilot_core_types::{ActionPlan, ElementSnapshot, TaskId};
use deskpilot_policy_center::{ExecutionConfig, ExecutionMode};
use serde::Serialize;
use tokio::sync::oneshot;

use crate::error::SupervisorError;
use crate::metrics::SupervisorMetricsSnapshot;

/// A plan handed to the engine together with the element snapshot it refers to.
#[derive(Clone, Debug)]
pub struct PlanRequest {
    pub task_id: TaskId,
    pub actions: Vec<ActionPlan>,
    pub elements: Arc<ElementSnapshot>,
    /// User command the plan was generated from, used for the completion check.
    pub original_command: Option<String>,
    pub previous_output: Option<String>,
}

impl PlanRequest {
    pub fn new(actions: Vec<ActionPlan>, elements: ElementSnapshot) -> Self {
        Self {
            task_id: TaskId::new(),
            actions,
            elements: Arc::new(elements),
            original_command: None,
            previous_output: None,
        }
    }

    pub fn with_task_id(mut self, task_id: TaskId) -> Self {
        self.task_id = task_id;
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.original_command = Some(command.into());
        self
    }

    pub fn with_previous_output(mut self, output: impl Into<String>) -> Self {
        self.previous_output = Some(output.into());
        self
    }
}

/// Handle to a started plan; resolves once the plan reaches a terminal state.
pub struct RunHandle {
    pub task_id: TaskId,
    pub receiver: oneshot::Receiver<TaskExecutionResult>,
}

impl RunHandle {
    pub async fn wait(self) -> Result<TaskExecutionResult, SupervisorError> {
        self.receiver.await.map_err(|_| SupervisorError::WorkerLost)
    }
}

/// Point-in-time view of the engine, published periodically on the bus.
#[derive(Clone, Debug, Default, Serialize)]
pub struct StatusSnapshot {
    pub task_id: Option<TaskId>,
    pub state: Option<ExecutionStatus>,
    pub mode: Option<ExecutionMode>,
    /// Execution settings pinned for the active plan.
    pub config: Option<ExecutionConfig>,
    pub running: bool,
    pub paused: bool,
    pub current_index: Option<usize>,
    pub total_actions: usize,
    pub finished_actions: usize,
    pub succeeded_actions: usize,
    pub pending_confirmation: Option<usize>,
    pub metrics: SupervisorMetricsSnapshot,
}
