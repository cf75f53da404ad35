use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use deskpilot_action_flow::{
    ActionExecutor, ActionRunner, AttemptObserver, CaptureProvider, ExecutionResult,
    ExecutionStatus, LoopConfig, TaskExecutionResult,
};
use deskpilot_action_gate::{DefaultResultValidator, ResultValidator};
use deskpilot_core_types::{ActionPlan, TaskId};
use deskpilot_event_bus::{EventBus, InMemoryBus};
use deskpilot_policy_center::{ExecutionConfig, PolicyCenter, PolicyView};
use deskpilot_safety_broker::{SafetyAssessor, SafetyConfig};
use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::completion::build_prompt;
use crate::error::SupervisorError;
use crate::events::SupervisorEvent;
use crate::gate::ConfirmationGate;
use crate::metrics::{SupervisorMetrics, SupervisorMetricsSnapshot};
use crate::mode::needs_confirmation;
use crate::model::{PlanRequest, RunHandle, StatusSnapshot};
use crate::state::Lifecycle;

const DEFAULT_EVENT_CAPACITY: usize = 256;

pub struct EngineBuilder {
    policy: Arc<dyn PolicyCenter>,
    executor: Arc<dyn ActionExecutor>,
    assessor: Option<Arc<SafetyAssessor>>,
    capture: Option<Arc<dyn CaptureProvider>>,
    validator: Option<Arc<dyn ResultValidator>>,
    event_capacity: usize,
}

impl EngineBuilder {
    pub fn with_assessor(mut self, assessor: Arc<SafetyAssessor>) -> Self {
        self.assessor = Some(assessor);
        self
    }

    pub fn with_capture(mut self, capture: Arc<dyn CaptureProvider>) -> Self {
        self.capture = Some(capture);
        self
    }

    /// Replaces the default validator, which is rebuilt per plan from policy.
    pub fn with_validator(mut self, validator: Arc<dyn ResultValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn build(self) -> ExecutionEngine {
        ExecutionEngine {
            inner: Arc::new(EngineInner {
                policy: self.policy,
                assessor: self.assessor.unwrap_or_default(),
                executor: self.executor,
                capture: self.capture,
                validator: self.validator,
                bus: InMemoryBus::new(self.event_capacity),
                gate: ConfirmationGate::new(),
                metrics: SupervisorMetrics::default(),
                active: Mutex::new(None),
            }),
        }
    }
}

/// Runs one plan at a time under the safety, confirmation and retry policy.
#[derive(Clone)]
pub struct ExecutionEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    policy: Arc<dyn PolicyCenter>,
    assessor: Arc<SafetyAssessor>,
    executor: Arc<dyn ActionExecutor>,
    capture: Option<Arc<dyn CaptureProvider>>,
    validator: Option<Arc<dyn ResultValidator>>,
    bus: Arc<InMemoryBus<SupervisorEvent>>,
    gate: ConfirmationGate,
    metrics: SupervisorMetrics,
    active: Mutex<Option<ActiveRun>>,
}

#[derive(Clone)]
struct ActiveRun {
    task_id: TaskId,
    execution: ExecutionConfig,
    cancel: CancellationToken,
    done: CancellationToken,
    pause: Arc<watch::Sender<bool>>,
    lifecycle: Arc<Mutex<Lifecycle>>,
    progress: Arc<Mutex<Progress>>,
}

#[derive(Default)]
struct Progress {
    current_index: Option<usize>,
    total: usize,
    results: Vec<ExecutionResult>,
}

struct WorkerOutcome {
    final_error: Option<String>,
    halt_reason: Option<String>,
}

impl ExecutionEngine {
    pub fn builder(
        policy: Arc<dyn PolicyCenter>,
        executor: Arc<dyn ActionExecutor>,
    ) -> EngineBuilder {
        EngineBuilder {
            policy,
            executor,
            assessor: None,
            capture: None,
            validator: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.inner.bus.subscribe()
    }

    pub fn bus(&self) -> Arc<InMemoryBus<SupervisorEvent>> {
        Arc::clone(&self.inner.bus)
    }

    /// Rule registry and counters. Rule edits apply from the next plan on.
    pub fn assessor(&self) -> &Arc<SafetyAssessor> {
        &self.inner.assessor
    }

    pub fn policy(&self) -> &Arc<dyn PolicyCenter> {
        &self.inner.policy
    }

    pub fn metrics(&self) -> SupervisorMetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.inner.active.lock().is_some()
    }

    pub fn status(&self) -> StatusSnapshot {
        let active = self.inner.active.lock().clone();
        self.inner.status_of(active.as_ref())
    }

    /// Starts a plan on its own worker task. Rejects empty plans and a second
    /// plan while one is active.
    pub async fn execute_plan(&self, request: PlanRequest) -> Result<RunHandle, SupervisorError> {
        if request.actions.is_empty() {
            return Err(SupervisorError::EmptyPlan);
        }
        let guard = self.inner.policy.guard().await;
        let policy = PolicyView::from(guard.snapshot().as_ref());

        let run = {
            let mut active = self.inner.active.lock();
            if active.is_some() {
                warn!(task_id = %request.task_id, "plan rejected, engine busy");
                return Err(SupervisorError::Busy);
            }
            let (pause, _) = watch::channel(false);
            let mut lifecycle = Lifecycle::default();
            lifecycle.transition(ExecutionStatus::Running)?;
            let run = ActiveRun {
                task_id: request.task_id.clone(),
                execution: policy.execution.clone(),
                cancel: CancellationToken::new(),
                done: CancellationToken::new(),
                pause: Arc::new(pause),
                lifecycle: Arc::new(Mutex::new(lifecycle)),
                progress: Arc::new(Mutex::new(Progress {
                    total: request.actions.len(),
                    ..Progress::default()
                })),
            };
            *active = Some(run.clone());
            run
        };

        info!(
            task_id = %run.task_id,
            actions = request.actions.len(),
            mode = %policy.execution.mode,
            policy_rev = guard.revision(),
            "plan started"
        );
        self.inner.metrics.record_task_started();
        self.inner.bus.emit(SupervisorEvent::Started {
            task_id: run.task_id.clone(),
            total_actions: request.actions.len(),
        });

        let (tx, rx) = oneshot::channel();
        let request = Arc::new(request);
        let started_at = Utc::now();

        spawn_status_reporter(
            Arc::clone(&self.inner),
            run.clone(),
            Duration::from_millis(policy.supervisor.status_interval_ms.max(10)),
        );

        let worker = tokio::spawn(run_plan(
            Arc::clone(&self.inner),
            run.clone(),
            Arc::clone(&request),
            policy,
        ));

        let inner = Arc::clone(&self.inner);
        let task_id = run.task_id.clone();
        tokio::spawn(async move {
            let outcome = match worker.await {
                Ok(outcome) => outcome,
                Err(err) => {
                    error!(task_id = %run.task_id, %err, "plan worker failed");
                    WorkerOutcome {
                        final_error: Some(format!("supervisor worker failed: {err}")),
                        halt_reason: Some("worker failed".to_string()),
                    }
                }
            };
            let result = inner.finalize(&run, &request, outcome, started_at);
            if tx.send(result).is_err() {
                debug!(task_id = %run.task_id, "run handle dropped before completion");
            }
        });

        Ok(RunHandle {
            task_id,
            receiver: rx,
        })
    }

    pub fn pause(&self) -> Result<(), SupervisorError> {
        self.set_paused(true)
    }

    pub fn resume(&self) -> Result<(), SupervisorError> {
        self.set_paused(false)
    }

    fn set_paused(&self, paused: bool) -> Result<(), SupervisorError> {
        let run = self.active_run()?;
        let target = if paused {
            ExecutionStatus::Paused
        } else {
            ExecutionStatus::Running
        };
        // The flag and the lifecycle change under one lock so they never disagree.
        let mut lifecycle = run.lifecycle.lock();
        lifecycle.transition(target)?;
        run.pause.send_replace(paused);
        let event = if paused {
            SupervisorEvent::Paused {
                task_id: run.task_id.clone(),
            }
        } else {
            SupervisorEvent::Resumed {
                task_id: run.task_id.clone(),
            }
        };
        self.inner.bus.emit(event);
        drop(lifecycle);

        info!(task_id = %run.task_id, paused, "pause state changed");
        Ok(())
    }

    /// Requests cancellation. The in-flight action finishes; nothing after it runs.
    pub fn stop(&self) -> Result<(), SupervisorError> {
        let run = self.active_run()?;
        if run.cancel.is_cancelled() {
            return Ok(());
        }
        run.cancel.cancel();
        self.inner.gate.cancel_all();
        info!(task_id = %run.task_id, "stop requested");
        self.inner.bus.emit(SupervisorEvent::Stopped {
            task_id: run.task_id,
        });
        Ok(())
    }

    /// Answers a pending confirmation. False when nothing is pending for `action_index`.
    pub fn confirm(&self, action_index: usize, approved: bool) -> bool {
        self.inner.gate.respond(action_index, approved)
    }

    fn active_run(&self) -> Result<ActiveRun, SupervisorError> {
        self.inner
            .active
            .lock()
            .clone()
            .ok_or(SupervisorError::NotRunning)
    }
}

impl EngineInner {
    fn status_of(&self, run: Option<&ActiveRun>) -> StatusSnapshot {
        let metrics = self.metrics.snapshot();
        let Some(run) = run else {
            return StatusSnapshot {
                metrics,
                ..StatusSnapshot::default()
            };
        };
        let (state, paused) = {
            let lifecycle = run.lifecycle.lock();
            (lifecycle.state(), *run.pause.borrow())
        };
        let progress = run.progress.lock();
        StatusSnapshot {
            task_id: Some(run.task_id.clone()),
            state: Some(state),
            mode: Some(run.execution.mode),
            config: Some(run.execution.clone()),
            running: !state.is_terminal(),
            paused,
            current_index: progress.current_index,
            total_actions: progress.total,
            finished_actions: progress.results.len(),
            succeeded_actions: progress.results.iter().filter(|r| r.is_success()).count(),
            pending_confirmation: self.gate.pending(),
            metrics,
        }
    }

    fn push_result(&self, run: &ActiveRun, result: ExecutionResult) {
        self.bus.emit(SupervisorEvent::ActionCompleted {
            task_id: run.task_id.clone(),
            result: result.clone(),
        });
        run.progress.lock().results.push(result);
    }

    fn finalize(
        &self,
        run: &ActiveRun,
        request: &PlanRequest,
        outcome: WorkerOutcome,
        started_at: chrono::DateTime<Utc>,
    ) -> TaskExecutionResult {
        let total = request.actions.len();
        let mut results = std::mem::take(&mut run.progress.lock().results);
        let reason = outcome
            .halt_reason
            .unwrap_or_else(|| "not executed".to_string());
        for (index, action) in request.actions.iter().enumerate().skip(results.len()) {
            results.push(ExecutionResult::cancelled(
                index,
                action,
                format!("not executed: {reason}"),
            ));
        }

        let status = if run.cancel.is_cancelled() {
            ExecutionStatus::Cancelled
        } else if outcome.final_error.is_some() {
            ExecutionStatus::Failed
        } else {
            TaskExecutionResult::settle_status(&results, total)
        };

        if let Err(err) = run.lifecycle.lock().finish(status) {
            warn!(task_id = %run.task_id, %err, "lifecycle already terminal");
        }
        match status {
            ExecutionStatus::Success => self.metrics.record_task_succeeded(),
            ExecutionStatus::Cancelled => self.metrics.record_task_cancelled(),
            _ => self.metrics.record_task_failed(),
        }

        let result = TaskExecutionResult::from_results(
            run.task_id.clone(),
            total,
            results,
            status,
            outcome.final_error,
            started_at,
        );

        run.done.cancel();
        self.gate.cancel_all();
        *self.active.lock() = None;

        info!(
            task_id = %result.task_id,
            status = %result.status,
            completed = result.completed_actions,
            total = result.total_actions,
            latency_ms = result.latency_ms,
            "plan finished"
        );
        self.bus.emit(SupervisorEvent::Completed {
            task_id: result.task_id.clone(),
            status,
            result: Box::new(result.clone()),
        });

        if status == ExecutionStatus::Success {
            if let Some(command) = &request.original_command {
                self.bus.emit(SupervisorEvent::CompletionCheckRequested {
                    task_id: result.task_id.clone(),
                    original_command: command.clone(),
                    previous_output: request.previous_output.clone(),
                    prompt: build_prompt(command, request.previous_output.as_deref(), &result),
                });
            }
        }
        result
    }
}

struct BusObserver<'a> {
    inner: &'a EngineInner,
    task_id: &'a TaskId,
}

impl AttemptObserver for BusObserver<'_> {
    fn attempt_started(&self, action_index: usize, action: &ActionPlan, attempt: u32) {
        self.inner.metrics.record_attempt();
        self.inner.bus.emit(SupervisorEvent::ActionStarted {
            task_id: self.task_id.clone(),
            action_index,
            description: action.description.clone(),
            attempt,
        });
    }
}

/// Blocks while paused. Returns false if cancelled meanwhile.
async fn wait_while_paused(pause: &mut watch::Receiver<bool>, cancel: &CancellationToken) -> bool {
    let paused = *pause.borrow_and_update();
    if !paused {
        return true;
    }
    debug!("worker paused between actions");
    tokio::select! {
        _ = cancel.cancelled() => false,
        resumed = pause.wait_for(|paused| !*paused) => resumed.is_ok(),
    }
}

async fn run_plan(
    inner: Arc<EngineInner>,
    run: ActiveRun,
    request: Arc<PlanRequest>,
    policy: PolicyView,
) -> WorkerOutcome {
    let ctx = inner
        .assessor
        .context_with(SafetyConfig::from(&policy.safety));
    let validator = inner.validator.clone().unwrap_or_else(|| {
        Arc::new(DefaultResultValidator::new(policy.validation.pixel_tolerance_px))
    });
    let runner = ActionRunner::new(Arc::clone(&inner.executor), LoopConfig::from_policy(&policy))
        .with_capture(inner.capture.clone())
        .with_validator(Some(validator));
    let observer = BusObserver {
        inner: &inner,
        task_id: &run.task_id,
    };

    let mut pause = run.pause.subscribe();
    let limit = policy.execution.max_execution_time();
    let deadline = Instant::now() + limit;
    let gate_timeout = Duration::from_millis(policy.gate.timeout_ms);
    let mut final_error = None;
    let mut halt_reason = None;

    for (index, action) in request.actions.iter().enumerate() {
        if run.cancel.is_cancelled() || !wait_while_paused(&mut pause, &run.cancel).await {
            info!(task_id = %run.task_id, index, "stop observed, halting plan");
            halt_reason = Some("execution stopped".to_string());
            break;
        }
        if Instant::now() >= deadline {
            let message = format!(
                "execution exceeded max_execution_time of {}ms",
                limit.as_millis()
            );
            warn!(task_id = %run.task_id, index, "{}", message);
            inner.bus.emit(SupervisorEvent::Error {
                task_id: run.task_id.clone(),
                action_index: Some(index),
                message: message.clone(),
            });
            halt_reason = Some(message.clone());
            final_error = Some(message);
            break;
        }
        run.progress.lock().current_index = Some(index);

        let assessment = inner
            .assessor
            .assess_in(&ctx, action, index, &request.elements);

        if assessment.block_execution {
            inner.metrics.record_blocked();
            let message = format!(
                "blocked by safety policy ({} risk: {})",
                assessment.risk_level,
                assessment.rule_names().join(", ")
            );
            warn!(task_id = %run.task_id, index, "{}", message);
            inner.bus.emit(SupervisorEvent::Error {
                task_id: run.task_id.clone(),
                action_index: Some(index),
                message: message.clone(),
            });
            inner.push_result(&run, ExecutionResult::failed(index, action, message));
            halt_reason = Some(format!("action {index} was blocked"));
            break;
        }

        if needs_confirmation(&policy.execution, &policy.safety, action.kind, &assessment) {
            let message = if assessment.warning_message.is_empty() {
                format!("Confirm {} action: {}", action.kind, action.description)
            } else {
                assessment.warning_message.clone()
            };
            let response = inner.gate.open(index);
            inner.bus.emit(SupervisorEvent::ConfirmationRequested {
                task_id: run.task_id.clone(),
                action_index: index,
                action_type: action.kind,
                risk_level: assessment.risk_level,
                message,
            });
            let decision = inner
                .gate
                .wait(index, response, gate_timeout, &run.cancel)
                .await;
            inner.metrics.record_confirmation(decision.is_approved());
            if !decision.is_approved() {
                inner.push_result(
                    &run,
                    ExecutionResult::cancelled(index, action, decision.to_string()),
                );
                halt_reason = Some(format!("action {index} {decision}"));
                break;
            }
        }

        let result = runner
            .run(index, action, &request.elements, &run.cancel, &observer)
            .await;
        inner.metrics.record_action(result.is_success(), result.retry_count);
        let failed = !result.is_success();
        inner.push_result(&run, result);

        if failed && policy.execution.strict_mode {
            warn!(task_id = %run.task_id, index, "strict mode, halting after failed action");
            halt_reason = Some(format!("strict mode halt after action {index} failed"));
            break;
        }
    }

    run.progress.lock().current_index = None;
    WorkerOutcome {
        final_error,
        halt_reason,
    }
}

fn spawn_status_reporter(inner: Arc<EngineInner>, run: ActiveRun, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = run.done.cancelled() => break,
                _ = ticker.tick() => {
                    let snapshot = inner.status_of(Some(&run));
                    inner.bus.emit(SupervisorEvent::Status(Box::new(snapshot)));
                }
            }
        }
    });
}
