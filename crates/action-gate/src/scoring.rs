//! Confidence scoring and key-token checks

use deskpilot_core_types::ActionKind;

use crate::types::ValidationOutcome;

/// Named keys accepted besides plain alphanumeric tokens
pub const KNOWN_KEYS: [&str; 9] = [
    "ctrl", "alt", "shift", "cmd", "win", "tab", "enter", "esc", "space",
];

/// Base confidence per outcome
pub fn base_confidence(outcome: ValidationOutcome) -> f64 {
    match outcome {
        ValidationOutcome::Success => 0.9,
        ValidationOutcome::Partial => 0.6,
        ValidationOutcome::Failed => 0.2,
        ValidationOutcome::Timeout => 0.1,
        ValidationOutcome::Error => 0.0,
    }
}

/// How observable an action type's effect is
pub fn reliability(kind: ActionKind) -> f64 {
    match kind {
        ActionKind::Wait => 1.0,
        ActionKind::Click | ActionKind::DoubleClick | ActionKind::RightClick | ActionKind::Move => {
            0.8
        }
        ActionKind::Scroll | ActionKind::Drag => 0.7,
        ActionKind::Type | ActionKind::Key | ActionKind::Hotkey => 0.6,
    }
}

/// Confidence for an outcome of an action type, clamped to [0, 1]
pub fn confidence_for(outcome: ValidationOutcome, kind: ActionKind) -> f64 {
    (base_confidence(outcome) * reliability(kind)).clamp(0.0, 1.0)
}

/// Whether a key token names a key the executor can press
pub fn is_known_key(token: &str) -> bool {
    KNOWN_KEYS.contains(&token)
        || (!token.is_empty() && token.chars().all(char::is_alphanumeric))
}
