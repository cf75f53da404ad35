use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use deskpilot_core_types::ActionKind;
use serde::{Deserialize, Serialize};

use crate::errors::PolicyError;

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct PolicySnapshot {
    pub rev: u64,
    pub execution: ExecutionConfig,
    pub safety: SafetyPolicy,
    pub validation: ValidationPolicy,
    pub gate: GatePolicy,
    pub supervisor: SupervisorPolicy,
    pub provenance: HashMap<String, PolicyProvenance>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionMode {
    /// Every action waits for an explicit approval.
    Manual,
    #[default]
    SemiAuto,
    FullAuto,
    StepByStep,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Manual => "MANUAL",
            ExecutionMode::SemiAuto => "SEMI_AUTO",
            ExecutionMode::FullAuto => "FULL_AUTO",
            ExecutionMode::StepByStep => "STEP_BY_STEP",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionMode {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "MANUAL" => Ok(ExecutionMode::Manual),
            "SEMI_AUTO" => Ok(ExecutionMode::SemiAuto),
            "FULL_AUTO" => Ok(ExecutionMode::FullAuto),
            "STEP_BY_STEP" => Ok(ExecutionMode::StepByStep),
            other => Err(PolicyError::InvalidValue(format!(
                "unknown execution mode: {other}"
            ))),
        }
    }
}

/// Per-task execution settings. Read once when a plan starts.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct ExecutionConfig {
    pub mode: ExecutionMode,
    pub confirm_dangerous_actions: bool,
    pub max_execution_time_ms: u64,
    pub strict_mode: bool,
    pub auto_retry: bool,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub capture_enabled: bool,
    pub settle_delay_ms: u64,
    pub enable_validation: bool,
}

impl ExecutionConfig {
    /// Retries the loop may spend on one action.
    pub fn retry_budget(&self) -> u32 {
        if self.auto_retry {
            self.max_retries
        } else {
            0
        }
    }

    pub fn max_execution_time(&self) -> Duration {
        Duration::from_millis(self.max_execution_time_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct SafetyPolicy {
    pub require_confirmation_for_medium: bool,
    pub block_high_risk: bool,
    pub block_critical_risk: bool,
    pub edge_threshold_px: u32,
    pub screen_width: u32,
    pub screen_height: u32,
    /// Kinds that SEMI_AUTO always confirms when dangerous-action confirmation is on.
    pub sensitive_types: Vec<ActionKind>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct ValidationPolicy {
    pub pixel_tolerance_px: u32,
    pub timeout_ms: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct GatePolicy {
    pub timeout_ms: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct SupervisorPolicy {
    pub status_interval_ms: u64,
    pub event_capacity: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolicyProvenance {
    pub path: String,
    pub source: PolicySource,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum PolicySource {
    Builtin,
    File,
    Env,
    Cli,
    RuntimeOverride,
}

/// Provenance-free copy handed to the engine for one task.
#[derive(Clone, Debug)]
pub struct PolicyView {
    pub rev: u64,
    pub execution: ExecutionConfig,
    pub safety: SafetyPolicy,
    pub validation: ValidationPolicy,
    pub gate: GatePolicy,
    pub supervisor: SupervisorPolicy,
}

impl From<PolicySnapshot> for PolicyView {
    fn from(snapshot: PolicySnapshot) -> Self {
        Self {
            rev: snapshot.rev,
            execution: snapshot.execution,
            safety: snapshot.safety,
            validation: snapshot.validation,
            gate: snapshot.gate,
            supervisor: snapshot.supervisor,
        }
    }
}

impl From<&PolicySnapshot> for PolicyView {
    fn from(snapshot: &PolicySnapshot) -> Self {
        PolicyView::from(snapshot.clone())
    }
}

impl PolicySnapshot {
    pub fn set_provenance(&mut self, path: &str, source: PolicySource) {
        self.provenance.insert(
            path.to_string(),
            PolicyProvenance {
                path: path.to_string(),
                source,
            },
        );
    }

    pub fn source_of(&self, path: &str) -> Option<PolicySource> {
        self.provenance.get(path).map(|entry| entry.source)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RuntimeOverrideSpec {
    pub path: String,
    pub value: serde_json::Value,
    pub owner: String,
    pub reason: String,
    pub ttl_seconds: u64,
}
