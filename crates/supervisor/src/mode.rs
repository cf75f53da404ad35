use deskpilot_core_types::ActionKind;
use deskpilot_policy_center::{ExecutionConfig, ExecutionMode, SafetyPolicy};
use deskpilot_safety_broker::SafetyAssessment;

/// Whether the mode asks for a human decision before dispatching `kind`.
///
/// Blocking is decided earlier; a blocked action never reaches this check.
pub fn needs_confirmation(
    execution: &ExecutionConfig,
    safety: &SafetyPolicy,
    kind: ActionKind,
    assessment: &SafetyAssessment,
) -> bool {
    match execution.mode {
        ExecutionMode::Manual | ExecutionMode::StepByStep => true,
        ExecutionMode::FullAuto => assessment.requires_confirmation,
        ExecutionMode::SemiAuto => {
            assessment.requires_confirmation
                || (execution.confirm_dangerous_actions && safety.sensitive_types.contains(&kind))
        }
    }
}
