//! Core types for result validation

use deskpilot_core_types::{ActionKind, ActionPlan, CaptureHandle, Point, ResolvedTarget};
use serde::{Deserialize, Serialize};

use crate::scoring::confidence_for;

/// Outcome of a post-action check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationOutcome {
    /// The action visibly did what was asked
    Success,

    /// The action ran but the evidence is weak or off-target
    Partial,

    /// The check found the action did not take effect
    Failed,

    /// The check did not finish in time
    Timeout,

    /// The check itself failed
    Error,
}

impl ValidationOutcome {
    /// Get outcome name
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationOutcome::Success => "SUCCESS",
            ValidationOutcome::Partial => "PARTIAL",
            ValidationOutcome::Failed => "FAILED",
            ValidationOutcome::Timeout => "TIMEOUT",
            ValidationOutcome::Error => "ERROR",
        }
    }

    /// SUCCESS and PARTIAL both let the action count as done
    pub fn is_acceptable(&self) -> bool {
        matches!(self, ValidationOutcome::Success | ValidationOutcome::Partial)
    }
}

/// Signals observed around one dispatched action
#[derive(Debug, Clone)]
pub struct ValidationContext {
    /// Where the action was aimed
    pub target: ResolvedTarget,

    /// Pointer position reported by the executor after the action
    pub pointer: Option<Point>,

    /// Screen state captured before dispatch
    pub capture_before: Option<CaptureHandle>,

    /// Screen state captured after dispatch
    pub capture_after: Option<CaptureHandle>,
}

impl ValidationContext {
    /// Create a context for a resolved target with no signals yet
    pub fn new(target: ResolvedTarget) -> Self {
        Self {
            target,
            pointer: None,
            capture_before: None,
            capture_after: None,
        }
    }

    /// Set pointer position
    pub fn with_pointer(mut self, pointer: Option<Point>) -> Self {
        self.pointer = pointer;
        self
    }

    /// Set before/after captures
    pub fn with_captures(
        mut self,
        before: Option<CaptureHandle>,
        after: Option<CaptureHandle>,
    ) -> Self {
        self.capture_before = before;
        self.capture_after = after;
        self
    }
}

impl Default for ValidationContext {
    fn default() -> Self {
        Self::new(ResolvedTarget::Nowhere)
    }
}

/// What was checked and against which target
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationDetails {
    /// Validation method used
    pub method: String,

    /// Referenced element, if any
    pub target_element_id: Option<String>,

    /// Raw coordinates from the plan, if any
    pub target_coordinates: Option<Vec<i32>>,

    /// Text or key payload, if any
    pub target_text: Option<String>,

    /// Pointer position the check observed
    pub observed_pointer: Option<Point>,

    /// Distance between pointer and target in pixels
    pub distance_px: Option<f64>,
}

impl ValidationDetails {
    /// Details seeded from the action's own fields
    pub fn for_action(action: &ActionPlan, method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            target_element_id: action.element_id.clone(),
            target_coordinates: action.coordinates.clone(),
            target_text: action.text.clone(),
            observed_pointer: None,
            distance_px: None,
        }
    }
}

/// Validation report for one action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Index of the action in its plan
    pub action_index: usize,

    /// Action type
    pub action_type: ActionKind,

    /// Action description
    pub description: String,

    /// Outcome
    pub result: ValidationOutcome,

    /// Confidence in [0, 1]
    pub confidence: f64,

    /// Validation latency in milliseconds
    pub latency_ms: u64,

    /// Why the outcome is not SUCCESS, when known
    pub error_message: Option<String>,

    /// Structured details
    pub details: ValidationDetails,

    /// Capture taken before the action
    pub capture_before: Option<CaptureHandle>,

    /// Capture taken after the action
    pub capture_after: Option<CaptureHandle>,

    /// When the report was produced
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ValidationReport {
    /// Create a report and score it
    pub fn new(
        action: &ActionPlan,
        action_index: usize,
        result: ValidationOutcome,
        details: ValidationDetails,
    ) -> Self {
        Self {
            action_index,
            action_type: action.kind,
            description: action.description.clone(),
            result,
            confidence: confidence_for(result, action.kind),
            latency_ms: 0,
            error_message: None,
            details,
            capture_before: None,
            capture_after: None,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Report for a check that ran out of time
    pub fn timed_out(action: &ActionPlan, action_index: usize, timeout_ms: u64) -> Self {
        Self::new(
            action,
            action_index,
            ValidationOutcome::Timeout,
            ValidationDetails::for_action(action, "timeout"),
        )
        .with_error(format!("validation exceeded {timeout_ms}ms"))
        .with_latency(timeout_ms)
    }

    /// Report for a check that failed internally
    pub fn errored(action: &ActionPlan, action_index: usize, message: impl Into<String>) -> Self {
        let mut report = Self::new(
            action,
            action_index,
            ValidationOutcome::Error,
            ValidationDetails::for_action(action, "error"),
        );
        report.error_message = Some(message.into());
        report
    }

    /// Set error message
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// Set latency
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Attach captures
    pub fn with_captures(
        mut self,
        before: Option<CaptureHandle>,
        after: Option<CaptureHandle>,
    ) -> Self {
        self.capture_before = before;
        self.capture_after = after;
        self
    }
}

/// Aggregate over the reports of a task
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub total_actions: usize,
    pub success_count: usize,
    pub partial_count: usize,
    pub failed_count: usize,
    pub timeout_count: usize,
    pub error_count: usize,
    pub success_rate: f64,
    pub average_confidence: f64,
    pub total_validation_ms: u64,
    pub summary: String,
}

impl ValidationSummary {
    /// Summarise a list of reports
    pub fn from_reports<'a>(reports: impl IntoIterator<Item = &'a ValidationReport>) -> Self {
        let mut summary = ValidationSummary::default();
        let mut confidence_sum = 0.0;
        for report in reports {
            summary.total_actions += 1;
            confidence_sum += report.confidence;
            summary.total_validation_ms += report.latency_ms;
            match report.result {
                ValidationOutcome::Success => summary.success_count += 1,
                ValidationOutcome::Partial => summary.partial_count += 1,
                ValidationOutcome::Failed => summary.failed_count += 1,
                ValidationOutcome::Timeout => summary.timeout_count += 1,
                ValidationOutcome::Error => summary.error_count += 1,
            }
        }
        if summary.total_actions == 0 {
            summary.summary = "No actions to validate".to_string();
            return summary;
        }
        let total = summary.total_actions as f64;
        summary.success_rate = summary.success_count as f64 / total;
        summary.average_confidence = confidence_sum / total;
        summary.summary = format!(
            "{}/{} actions validated successfully",
            summary.success_count, summary.total_actions
        );
        summary
    }
}
