//! Action execution loop

use crate::errors::FlowError;
use crate::strategies::{RetryDecision, RetryPolicy};
use crate::types::*;
use async_trait::async_trait;
use deskpilot_action_gate::{ResultValidator, ValidationContext, ValidationOutcome, ValidationReport};
use deskpilot_core_types::{
    ActionKind, ActionPlan, CaptureHandle, ElementSnapshot, Point, ResolvedTarget,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Performs OS-level primitives for resolved actions
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Perform one action; `Ok(false)` is a raw failure
    async fn execute(&self, action: &ActionPlan, target: &ResolvedTarget) -> Result<bool, FlowError>;

    /// Current pointer position, when the executor can read it
    async fn pointer_position(&self) -> Option<Point> {
        None
    }
}

/// Produces opaque screen-state handles
#[async_trait]
pub trait CaptureProvider: Send + Sync {
    async fn capture(&self) -> Option<CaptureHandle>;
}

/// Notified when an attempt is about to dispatch
pub trait AttemptObserver: Send + Sync {
    fn attempt_started(&self, action_index: usize, action: &ActionPlan, attempt: u32);
}

impl AttemptObserver for () {
    fn attempt_started(&self, _action_index: usize, _action: &ActionPlan, _attempt: u32) {}
}

/// Check that the action carries the payload its type needs
pub fn check_payload(action: &ActionPlan) -> Result<(), FlowError> {
    let missing = match action.kind {
        ActionKind::Type if action.text.is_none() => Some("type action needs text"),
        ActionKind::Key if action.text.as_deref().map_or(true, str::is_empty) => {
            Some("key action needs text")
        }
        ActionKind::Hotkey if action.keys.as_ref().map_or(true, Vec::is_empty) => {
            Some("hotkey action needs keys")
        }
        _ => None,
    };
    match missing {
        Some(reason) => Err(FlowError::InvalidPayload(reason.to_string())),
        None => Ok(()),
    }
}

/// One attempt's outcome before retry handling
struct Attempt {
    status: ExecutionStatus,
    error: Option<String>,
    capture_before: Option<CaptureHandle>,
    capture_after: Option<CaptureHandle>,
    validation: Option<ValidationReport>,
}

/// Dispatches actions one at a time with capture, validation and retry
pub struct ActionRunner {
    executor: Arc<dyn ActionExecutor>,
    capture: Option<Arc<dyn CaptureProvider>>,
    validator: Option<Arc<dyn ResultValidator>>,
    config: LoopConfig,
}

impl ActionRunner {
    /// Create a runner
    pub fn new(executor: Arc<dyn ActionExecutor>, config: LoopConfig) -> Self {
        Self {
            executor,
            capture: None,
            validator: None,
            config,
        }
    }

    /// Set capture provider
    pub fn with_capture(mut self, capture: Option<Arc<dyn CaptureProvider>>) -> Self {
        self.capture = capture;
        self
    }

    /// Set result validator
    pub fn with_validator(mut self, validator: Option<Arc<dyn ResultValidator>>) -> Self {
        self.validator = validator;
        self
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Run one action to a final result.
    ///
    /// Resolution and payload errors fail immediately without dispatch.
    /// Other failures are retried within the budget; cancellation is only
    /// observed between attempts.
    pub async fn run(
        &self,
        action_index: usize,
        action: &ActionPlan,
        elements: &ElementSnapshot,
        cancel: &CancellationToken,
        observer: &dyn AttemptObserver,
    ) -> ExecutionResult {
        let mut result = ExecutionResult::new(action_index, action);

        let target = match check_payload(action)
            .and_then(|_| action.resolve_target(elements).map_err(FlowError::from))
        {
            Ok(target) => target,
            Err(e) => {
                warn!(index = action_index, action = %action.kind, "Action not dispatched: {}", e);
                return result
                    .with_status(ExecutionStatus::Failed)
                    .with_error(e.to_string())
                    .finish();
            }
        };

        let policy = RetryPolicy::from(&self.config);
        let mut retries_used = 0;
        loop {
            observer.attempt_started(action_index, action, retries_used + 1);
            let attempt = self.attempt(action_index, action, &target).await;

            result.status = attempt.status;
            result.error = attempt.error;
            result.capture_before = attempt.capture_before;
            result.capture_after = attempt.capture_after;
            result.validation = attempt.validation;
            result.retry_count = retries_used;

            match policy.decide(result.status, retries_used) {
                RetryDecision::Stop => break,
                RetryDecision::Retry { retry, delay } => {
                    info!(
                        index = action_index,
                        attempt = retry + 1,
                        "Action failed, retrying after {}ms",
                        delay.as_millis()
                    );
                    if !policy.wait(delay, cancel).await {
                        break;
                    }
                    retries_used = retry;
                }
            }
        }

        if result.is_success() {
            debug!(index = action_index, retries = result.retry_count, "Action completed");
        } else {
            warn!(
                index = action_index,
                retries = result.retry_count,
                "Action failed: {}",
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
        result.finish()
    }

    /// Execute action once (without retry)
    async fn attempt(&self, action_index: usize, action: &ActionPlan, target: &ResolvedTarget) -> Attempt {
        let capture_before = self.take_capture().await;

        let raw = self.executor.execute(action, target).await;
        let mut attempt = Attempt {
            status: ExecutionStatus::Failed,
            error: None,
            capture_before,
            capture_after: None,
            validation: None,
        };

        match raw {
            Ok(true) => {}
            Ok(false) => {
                attempt.error = Some(format!("{} action reported failure", action.kind));
                return attempt;
            }
            Err(e) => {
                attempt.error = Some(e.to_string());
                return attempt;
            }
        }

        if self.config.capture_enabled && self.capture.is_some() {
            tokio::time::sleep(self.config.settle_delay).await;
            attempt.capture_after = self.take_capture().await;
        }

        let validator = match (&self.validator, self.config.enable_validation) {
            (Some(validator), true) => validator,
            _ => {
                attempt.status = ExecutionStatus::Success;
                return attempt;
            }
        };

        let context = ValidationContext::new(*target)
            .with_pointer(self.executor.pointer_position().await)
            .with_captures(attempt.capture_before.clone(), attempt.capture_after.clone());
        let report = self.validate(validator.as_ref(), action_index, action, &context).await;

        match report.result {
            ValidationOutcome::Success => attempt.status = ExecutionStatus::Success,
            ValidationOutcome::Partial => {
                attempt.status = ExecutionStatus::Success;
                attempt.error = Some(format!("partial success (confidence {:.2})", report.confidence));
            }
            outcome => {
                attempt.error = Some(
                    report
                        .error_message
                        .clone()
                        .unwrap_or_else(|| format!("validation {}", outcome.as_str())),
                );
            }
        }
        attempt.validation = Some(report);
        attempt
    }

    async fn validate(
        &self,
        validator: &dyn ResultValidator,
        action_index: usize,
        action: &ActionPlan,
        context: &ValidationContext,
    ) -> ValidationReport {
        let started = Instant::now();
        let limit = self.config.validation_timeout;
        match timeout(limit, validator.validate(action, action_index, context)).await {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                warn!(index = action_index, "Validation error: {}", e);
                ValidationReport::errored(action, action_index, e.to_string())
                    .with_latency(started.elapsed().as_millis() as u64)
            }
            Err(_) => {
                warn!(index = action_index, "Validation timed out after {}ms", limit.as_millis());
                ValidationReport::timed_out(action, action_index, limit.as_millis() as u64)
            }
        }
    }

    async fn take_capture(&self) -> Option<CaptureHandle> {
        if !self.config.capture_enabled {
            return None;
        }
        match &self.capture {
            Some(provider) => provider.capture().await,
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskpilot_action_gate::{DefaultResultValidator, GateError};
    use deskpilot_core_types::UIElement;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::time::Duration;

    /// Executor that replays a script of raw outcomes
    struct ScriptedExecutor {
        script: Mutex<VecDeque<Result<bool, FlowError>>>,
        calls: AtomicUsize,
        targets: Mutex<Vec<ResolvedTarget>>,
        pointer: Option<Point>,
    }

    impl ScriptedExecutor {
        fn new(script: Vec<Result<bool, FlowError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
                targets: Mutex::new(Vec::new()),
                pointer: None,
            })
        }

        fn with_pointer(script: Vec<Result<bool, FlowError>>, pointer: Point) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
                targets: Mutex::new(Vec::new()),
                pointer: Some(pointer),
            })
        }
    }

    #[async_trait]
    impl ActionExecutor for ScriptedExecutor {
        async fn execute(&self, _action: &ActionPlan, target: &ResolvedTarget) -> Result<bool, FlowError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.targets.lock().push(*target);
            self.script.lock().pop_front().unwrap_or(Ok(true))
        }

        async fn pointer_position(&self) -> Option<Point> {
            self.pointer
        }
    }

    struct CountingCapture(AtomicU32);

    #[async_trait]
    impl CaptureProvider for CountingCapture {
        async fn capture(&self) -> Option<CaptureHandle> {
            let n = self.0.fetch_add(1, Ordering::SeqCst);
            Some(CaptureHandle::new(format!("frame-{n}")))
        }
    }

    struct SlowValidator;

    #[async_trait]
    impl ResultValidator for SlowValidator {
        async fn validate(
            &self,
            _action: &ActionPlan,
            _action_index: usize,
            _context: &ValidationContext,
        ) -> Result<ValidationReport, GateError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(GateError::Internal("unreachable".into()))
        }
    }

    struct AttemptLog(Mutex<Vec<(usize, u32)>>);

    impl AttemptObserver for AttemptLog {
        fn attempt_started(&self, action_index: usize, _action: &ActionPlan, attempt: u32) {
            self.0.lock().push((action_index, attempt));
        }
    }

    fn fast_config() -> LoopConfig {
        LoopConfig {
            retry_budget: 2,
            retry_delay: Duration::from_millis(5),
            capture_enabled: false,
            settle_delay: Duration::ZERO,
            enable_validation: true,
            validation_timeout: Duration::from_millis(200),
        }
    }

    fn snapshot() -> ElementSnapshot {
        ElementSnapshot::new([UIElement::new(7, "button", vec![100, 100, 200, 140])])
    }

    #[tokio::test]
    async fn test_success_first_attempt() {
        let executor = ScriptedExecutor::new(vec![Ok(true)]);
        let runner = ActionRunner::new(executor.clone(), fast_config());
        let action = ActionPlan::new(ActionKind::Click, "ok").with_element("7");

        let result = runner
            .run(0, &action, &snapshot(), &CancellationToken::new(), &())
            .await;
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.retry_count, 0);
        assert_eq!(
            executor.targets.lock()[0],
            ResolvedTarget::At(Point::new(150, 120))
        );
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let executor = ScriptedExecutor::new(vec![
            Ok(false),
            Err(FlowError::Executor("device busy".into())),
            Ok(true),
        ]);
        let runner = ActionRunner::new(executor.clone(), fast_config());
        let log = AttemptLog(Mutex::new(Vec::new()));
        let action = ActionPlan::new(ActionKind::Type, "name").with_text("hello");

        let result = runner
            .run(3, &action, &snapshot(), &CancellationToken::new(), &log)
            .await;
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.retry_count, 2);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 3);
        assert_eq!(*log.0.lock(), vec![(3, 1), (3, 2), (3, 3)]);
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted() {
        let executor = ScriptedExecutor::new(vec![Ok(false), Ok(false), Ok(false), Ok(true)]);
        let runner = ActionRunner::new(executor.clone(), fast_config());
        let action = ActionPlan::new(ActionKind::Wait, "settle").with_duration(0.0);

        let result = runner
            .run(0, &action, &snapshot(), &CancellationToken::new(), &())
            .await;
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.retry_count, 2);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_no_retry_when_disabled() {
        let executor = ScriptedExecutor::new(vec![Ok(false), Ok(true)]);
        let config = fast_config().with_retries(0, Duration::ZERO);
        let runner = ActionRunner::new(executor.clone(), config);
        let action = ActionPlan::new(ActionKind::Wait, "settle");

        let result = runner
            .run(0, &action, &snapshot(), &CancellationToken::new(), &())
            .await;
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.retry_count, 0);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unresolved_target_not_dispatched() {
        let executor = ScriptedExecutor::new(vec![]);
        let runner = ActionRunner::new(executor.clone(), fast_config());
        let action = ActionPlan::new(ActionKind::Click, "ghost").with_element("99");

        let result = runner
            .run(0, &action, &snapshot(), &CancellationToken::new(), &())
            .await;
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.retry_count, 0);
        assert!(result.error.unwrap().contains("resolve"));
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_payload_not_dispatched() {
        let executor = ScriptedExecutor::new(vec![]);
        let runner = ActionRunner::new(executor.clone(), fast_config());

        for action in [
            ActionPlan::new(ActionKind::Type, "no text"),
            ActionPlan::new(ActionKind::Key, "no key"),
            ActionPlan::new(ActionKind::Hotkey, "no keys"),
        ] {
            let result = runner
                .run(0, &action, &snapshot(), &CancellationToken::new(), &())
                .await;
            assert_eq!(result.status, ExecutionStatus::Failed);
        }
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancellation_stops_retries() {
        let executor = ScriptedExecutor::new(vec![Ok(false), Ok(true)]);
        let config = fast_config().with_retries(2, Duration::from_secs(60));
        let runner = ActionRunner::new(executor.clone(), config);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let action = ActionPlan::new(ActionKind::Wait, "settle");

        let result = runner.run(0, &action, &snapshot(), &cancel, &()).await;
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.retry_count, 0);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_partial_validation_counts_as_success() {
        let executor = ScriptedExecutor::with_pointer(vec![Ok(true)], Point::new(400, 400));
        let validator: Arc<dyn ResultValidator> = Arc::new(DefaultResultValidator::default());
        let runner =
            ActionRunner::new(executor, fast_config()).with_validator(Some(validator));
        let action = ActionPlan::new(ActionKind::Click, "ok").with_element("7");

        let result = runner
            .run(0, &action, &snapshot(), &CancellationToken::new(), &())
            .await;
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.error.as_deref(), Some("partial success (confidence 0.48)"));
        assert_eq!(
            result.validation.as_ref().map(|r| r.result),
            Some(ValidationOutcome::Partial)
        );
    }

    #[tokio::test]
    async fn test_validation_timeout_fails_and_retries() {
        let executor = ScriptedExecutor::new(vec![]);
        let validator: Arc<dyn ResultValidator> = Arc::new(SlowValidator);
        let config = fast_config()
            .with_retries(1, Duration::from_millis(1))
            .with_validation_timeout(Duration::from_millis(20));
        let runner = ActionRunner::new(executor.clone(), config).with_validator(Some(validator));
        let action = ActionPlan::new(ActionKind::Wait, "settle");

        let result = runner
            .run(0, &action, &snapshot(), &CancellationToken::new(), &())
            .await;
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.retry_count, 1);
        assert_eq!(
            result.validation.map(|r| r.result),
            Some(ValidationOutcome::Timeout)
        );
        assert_eq!(executor.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_captures_recorded() {
        let executor = ScriptedExecutor::new(vec![Ok(true)]);
        let capture: Arc<dyn CaptureProvider> = Arc::new(CountingCapture(AtomicU32::new(0)));
        let validator: Arc<dyn ResultValidator> = Arc::new(DefaultResultValidator::default());
        let config = LoopConfig {
            capture_enabled: true,
            ..fast_config()
        };
        let runner = ActionRunner::new(executor, config)
            .with_capture(Some(capture))
            .with_validator(Some(validator));
        let action = ActionPlan::new(ActionKind::Click, "ok").with_coordinates(vec![10, 10]);

        let result = runner
            .run(0, &action, &snapshot(), &CancellationToken::new(), &())
            .await;
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.capture_before, Some(CaptureHandle::new("frame-0")));
        assert_eq!(result.capture_after, Some(CaptureHandle::new("frame-1")));
        assert_eq!(
            result.validation.map(|r| r.details.method),
            Some("capture_diff".to_string())
        );
    }
}
