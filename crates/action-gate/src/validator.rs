//! Result validator with per-action-type checks

use crate::{errors::GateError, scoring::is_known_key, types::*};
use async_trait::async_trait;
use deskpilot_core_types::{ActionKind, ActionPlan, Point};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Default distance in pixels a pointer may land from its target
pub const DEFAULT_PIXEL_TOLERANCE: u32 = 10;

/// Result validator trait
#[async_trait]
pub trait ResultValidator: Send + Sync {
    /// Grade one dispatched action against the signals observed around it
    async fn validate(
        &self,
        action: &ActionPlan,
        action_index: usize,
        context: &ValidationContext,
    ) -> Result<ValidationReport, GateError>;
}

/// Default result validator implementation
///
/// Click-family, move, scroll and drag actions are checked against the pointer
/// position when one is available. Clicks fall back to comparing the before and
/// after captures. Key and hotkey actions are checked for key names the executor
/// can press. Typing and waiting cannot be observed here and pass as dispatched.
#[derive(Debug, Clone)]
pub struct DefaultResultValidator {
    /// Maximum pointer distance from the target, in pixels
    pub pixel_tolerance: u32,
}

impl Default for DefaultResultValidator {
    fn default() -> Self {
        Self::new(DEFAULT_PIXEL_TOLERANCE)
    }
}

impl DefaultResultValidator {
    /// Create a validator with the given pointer tolerance
    pub fn new(pixel_tolerance: u32) -> Self {
        Self { pixel_tolerance }
    }

    /// Compare the pointer position with the expected resting point
    fn check_position(
        &self,
        action: &ActionPlan,
        expected: Point,
        pointer: Point,
    ) -> (ValidationOutcome, ValidationDetails, Option<String>) {
        let distance = pointer.distance_to(&expected);
        let mut details = ValidationDetails::for_action(action, "pointer_position");
        details.observed_pointer = Some(pointer);
        details.distance_px = Some(distance);

        if distance <= f64::from(self.pixel_tolerance) {
            debug!(distance, "pointer within tolerance");
            (ValidationOutcome::Success, details, None)
        } else {
            let message = format!(
                "pointer at ({}, {}) is {:.1}px from target ({}, {})",
                pointer.x, pointer.y, distance, expected.x, expected.y
            );
            (ValidationOutcome::Partial, details, Some(message))
        }
    }

    /// Click family: pointer first, then capture diff, else accept
    fn check_click(
        &self,
        action: &ActionPlan,
        context: &ValidationContext,
    ) -> (ValidationOutcome, ValidationDetails, Option<String>) {
        if let (Some(expected), Some(pointer)) =
            (context.target.expected_pointer(), context.pointer)
        {
            return self.check_position(action, expected, pointer);
        }

        if let (Some(before), Some(after)) = (&context.capture_before, &context.capture_after) {
            let details = ValidationDetails::for_action(action, "capture_diff");
            return if before != after {
                (ValidationOutcome::Success, details, None)
            } else {
                (
                    ValidationOutcome::Partial,
                    details,
                    Some("screen did not change after click".to_string()),
                )
            };
        }

        (
            ValidationOutcome::Success,
            ValidationDetails::for_action(action, "basic"),
            None,
        )
    }

    /// Move, scroll and drag: pointer check when possible
    fn check_motion(
        &self,
        action: &ActionPlan,
        context: &ValidationContext,
    ) -> (ValidationOutcome, ValidationDetails, Option<String>) {
        match (context.target.expected_pointer(), context.pointer) {
            (Some(expected), Some(pointer)) => self.check_position(action, expected, pointer),
            _ => (
                ValidationOutcome::Success,
                ValidationDetails::for_action(action, "basic"),
                None,
            ),
        }
    }

    /// Key and hotkey: every token must name a pressable key
    fn check_keys(
        &self,
        action: &ActionPlan,
    ) -> (ValidationOutcome, ValidationDetails, Option<String>) {
        let tokens = action.key_tokens();
        let mut details = ValidationDetails::for_action(action, "key_validity");
        if details.target_text.is_none() && !tokens.is_empty() {
            details.target_text = Some(tokens.join("+"));
        }

        let unknown: Vec<&str> = tokens
            .iter()
            .map(String::as_str)
            .filter(|token| !is_known_key(token))
            .collect();

        if tokens.is_empty() {
            (
                ValidationOutcome::Partial,
                details,
                Some("no keys to press".to_string()),
            )
        } else if unknown.is_empty() {
            (ValidationOutcome::Success, details, None)
        } else {
            let message = format!("unrecognised keys: {}", unknown.join(", "));
            (ValidationOutcome::Partial, details, Some(message))
        }
    }
}

#[async_trait]
impl ResultValidator for DefaultResultValidator {
    async fn validate(
        &self,
        action: &ActionPlan,
        action_index: usize,
        context: &ValidationContext,
    ) -> Result<ValidationReport, GateError> {
        let start = Instant::now();
        debug!(
            index = action_index,
            action = %action.kind,
            "validating action result"
        );

        let (outcome, details, message) = match action.kind {
            ActionKind::Click | ActionKind::DoubleClick | ActionKind::RightClick => {
                self.check_click(action, context)
            }
            ActionKind::Move | ActionKind::Scroll | ActionKind::Drag => {
                self.check_motion(action, context)
            }
            ActionKind::Key | ActionKind::Hotkey => self.check_keys(action),
            ActionKind::Type => (
                ValidationOutcome::Success,
                ValidationDetails::for_action(action, "completion"),
                None,
            ),
            ActionKind::Wait => (
                ValidationOutcome::Success,
                ValidationDetails::for_action(action, "basic"),
                None,
            ),
        };

        let mut report = ValidationReport::new(action, action_index, outcome, details)
            .with_captures(context.capture_before.clone(), context.capture_after.clone())
            .with_latency(start.elapsed().as_millis() as u64);
        report.error_message = message;

        match outcome {
            ValidationOutcome::Success => info!(
                index = action_index,
                action = %action.kind,
                confidence = report.confidence,
                method = %report.details.method,
                "action validated"
            ),
            _ => warn!(
                index = action_index,
                action = %action.kind,
                outcome = outcome.as_str(),
                reason = report.error_message.as_deref().unwrap_or(""),
                "action validated with reservations"
            ),
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskpilot_core_types::{CaptureHandle, ResolvedTarget};

    fn at(x: i32, y: i32) -> ValidationContext {
        ValidationContext::new(ResolvedTarget::At(Point::new(x, y)))
    }

    #[tokio::test]
    async fn click_on_target_succeeds() {
        let validator = DefaultResultValidator::default();
        let action = ActionPlan::new(ActionKind::Click, "press OK").with_coordinates(vec![100, 100]);
        let context = at(100, 100).with_pointer(Some(Point::new(103, 104)));

        let report = validator.validate(&action, 0, &context).await.unwrap();
        assert_eq!(report.result, ValidationOutcome::Success);
        assert_eq!(report.details.method, "pointer_position");
        assert_eq!(report.details.distance_px, Some(5.0));
        assert!((report.confidence - 0.72).abs() < 1e-9);
    }

    #[tokio::test]
    async fn click_off_target_is_partial() {
        let validator = DefaultResultValidator::default();
        let action = ActionPlan::new(ActionKind::Click, "press OK").with_coordinates(vec![100, 100]);
        let context = at(100, 100).with_pointer(Some(Point::new(150, 100)));

        let report = validator.validate(&action, 2, &context).await.unwrap();
        assert_eq!(report.result, ValidationOutcome::Partial);
        assert_eq!(report.action_index, 2);
        assert!(report.error_message.unwrap().contains("50.0px"));
    }

    #[tokio::test]
    async fn click_without_pointer_compares_captures() {
        let validator = DefaultResultValidator::default();
        let action = ActionPlan::new(ActionKind::DoubleClick, "open file");

        let changed = at(10, 10).with_captures(
            Some(CaptureHandle::new("before")),
            Some(CaptureHandle::new("after")),
        );
        let report = validator.validate(&action, 0, &changed).await.unwrap();
        assert_eq!(report.result, ValidationOutcome::Success);
        assert_eq!(report.details.method, "capture_diff");

        let unchanged = at(10, 10).with_captures(
            Some(CaptureHandle::new("same")),
            Some(CaptureHandle::new("same")),
        );
        let report = validator.validate(&action, 0, &unchanged).await.unwrap();
        assert_eq!(report.result, ValidationOutcome::Partial);
    }

    #[tokio::test]
    async fn click_without_signals_passes() {
        let validator = DefaultResultValidator::default();
        let action = ActionPlan::new(ActionKind::RightClick, "context menu");
        let report = validator.validate(&action, 0, &at(5, 5)).await.unwrap();
        assert_eq!(report.result, ValidationOutcome::Success);
        assert_eq!(report.details.method, "basic");
    }

    #[tokio::test]
    async fn key_checks() {
        let validator = DefaultResultValidator::default();
        let context = ValidationContext::default();

        let ok = ActionPlan::new(ActionKind::Key, "copy").with_text("ctrl+c");
        let report = validator.validate(&ok, 0, &context).await.unwrap();
        assert_eq!(report.result, ValidationOutcome::Success);
        assert_eq!(report.details.method, "key_validity");

        let odd = ActionPlan::new(ActionKind::Hotkey, "page").with_keys(["ctrl", "page_up"]);
        let report = validator.validate(&odd, 0, &context).await.unwrap();
        assert_eq!(report.result, ValidationOutcome::Partial);
        assert_eq!(report.details.target_text.as_deref(), Some("ctrl+page_up"));
        assert!(report.error_message.unwrap().contains("page_up"));
    }

    #[tokio::test]
    async fn drag_checks_end_point() {
        let validator = DefaultResultValidator::default();
        let action = ActionPlan::new(ActionKind::Drag, "move file").with_coordinates(vec![0, 0, 300, 200]);
        let context = ValidationContext::new(ResolvedTarget::Path {
            from: Point::new(0, 0),
            to: Point::new(300, 200),
        })
        .with_pointer(Some(Point::new(300, 200)));

        let report = validator.validate(&action, 0, &context).await.unwrap();
        assert_eq!(report.result, ValidationOutcome::Success);
        assert!((report.confidence - 0.63).abs() < 1e-9);
    }

    #[tokio::test]
    async fn type_and_wait_pass() {
        let validator = DefaultResultValidator::default();
        let context = ValidationContext::default();
        let typing = ActionPlan::new(ActionKind::Type, "name").with_text("hello");
        let waiting = ActionPlan::new(ActionKind::Wait, "settle").with_duration(1.0);

        let report = validator.validate(&typing, 0, &context).await.unwrap();
        assert_eq!(report.result, ValidationOutcome::Success);
        assert_eq!(report.details.method, "completion");

        let report = validator.validate(&waiting, 1, &context).await.unwrap();
        assert!((report.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn summary_counts_outcomes() {
        let action = ActionPlan::new(ActionKind::Wait, "settle");
        let reports = vec![
            ValidationReport::new(
                &action,
                0,
                ValidationOutcome::Success,
                ValidationDetails::for_action(&action, "basic"),
            )
            .with_latency(4),
            ValidationReport::timed_out(&action, 1, 5000),
            ValidationReport::errored(&action, 2, "boom"),
        ];

        let summary = ValidationSummary::from_reports(&reports);
        assert_eq!(summary.total_actions, 3);
        assert_eq!(summary.success_count, 1);
        assert_eq!(summary.timeout_count, 1);
        assert_eq!(summary.error_count, 1);
        assert_eq!(summary.total_validation_ms, 5004);
        assert!((summary.success_rate - 1.0 / 3.0).abs() < 1e-9);
        assert!((summary.average_confidence - (0.9 + 0.1) / 3.0).abs() < 1e-9);
        assert_eq!(summary.summary, "1/3 actions validated successfully");
    }

    #[test]
    fn empty_summary() {
        let summary = ValidationSummary::from_reports(std::iter::empty());
        assert_eq!(summary.total_actions, 0);
        assert_eq!(summary.success_rate, 0.0);
    }

    #[test]
    fn blocking_validate_with_tokio_test() {
        let validator = DefaultResultValidator::new(0);
        let action = ActionPlan::new(ActionKind::Move, "hover").with_coordinates(vec![1, 1]);
        let context = at(1, 1).with_pointer(Some(Point::new(1, 2)));
        let report = tokio_test::block_on(validator.validate(&action, 0, &context)).unwrap();
        assert_eq!(report.result, ValidationOutcome::Partial);
    }
}
