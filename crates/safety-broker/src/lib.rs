//! Risk rules and per-action safety assessment.
//!
//! The [`RuleSet`] is the registry of pattern rules (built-in and custom);
//! the [`SafetyAssessor`] grades one action at a time against a rule-set
//! snapshot and keeps the running execution counters.

pub mod assessment;
pub mod config;
pub mod risk;
pub mod rules;
pub mod stats;

pub use crate::assessment::{
    AssessmentContext, FixedScreen, SafetyAssessment, SafetyAssessor, SafetyConfig, ScreenGeometry,
};
pub use crate::config::{load_rule_file, parse_rule_file, RuleFile, RuleSpec};
pub use crate::risk::RiskLevel;
pub use crate::rules::{builtin_rules, RuleOrigin, RulePattern, RuleSet, SafetyRule};
pub use crate::stats::{SafetyStats, StatsReport};

use deskpilot_core_types::DeskError;
use thiserror::Error;

/// Errors produced by the safety surface.
#[derive(Clone, Debug, Error)]
pub enum SafetyError {
    #[error("rule already registered: {0}")]
    DuplicateRule(String),
    #[error("invalid rule: {0}")]
    InvalidRule(String),
    #[error("screen geometry unavailable: {0}")]
    Geometry(String),
    #[error(transparent)]
    Core(#[from] DeskError),
}

impl From<SafetyError> for DeskError {
    fn from(value: SafetyError) -> Self {
        match value {
            SafetyError::Core(inner) => inner,
            other => DeskError::new(other.to_string()),
        }
    }
}
