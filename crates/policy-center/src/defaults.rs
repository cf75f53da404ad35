use deskpilot_core_types::ActionKind;

use crate::model::{
    ExecutionConfig, ExecutionMode, GatePolicy, PolicySnapshot, SafetyPolicy, SupervisorPolicy,
    ValidationPolicy,
};

pub fn default_snapshot() -> PolicySnapshot {
    PolicySnapshot {
        rev: 1,
        execution: ExecutionConfig {
            mode: ExecutionMode::SemiAuto,
            confirm_dangerous_actions: true,
            max_execution_time_ms: 300_000,
            strict_mode: false,
            auto_retry: true,
            max_retries: 2,
            retry_delay_ms: 1_000,
            capture_enabled: true,
            settle_delay_ms: 500,
            enable_validation: true,
        },
        safety: SafetyPolicy {
            require_confirmation_for_medium: true,
            block_high_risk: false,
            block_critical_risk: true,
            edge_threshold_px: 20,
            screen_width: 1920,
            screen_height: 1080,
            sensitive_types: vec![ActionKind::Drag, ActionKind::Key, ActionKind::Hotkey],
        },
        validation: ValidationPolicy {
            pixel_tolerance_px: 10,
            timeout_ms: 5_000,
        },
        gate: GatePolicy { timeout_ms: 30_000 },
        supervisor: SupervisorPolicy {
            status_interval_ms: 1_000,
            event_capacity: 256,
        },
        provenance: Default::default(),
    }
}
