use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use deskpilot_core_types::{ActionKind, ActionPlan, ElementSnapshot, Point};
use deskpilot_policy_center::SafetyPolicy;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, warn};

use crate::risk::RiskLevel;
use crate::rules::{RuleSet, SafetyRule};
use crate::stats::{SafetyStats, StatsReport};
use crate::SafetyError;

const MAX_LISTED_RULES: usize = 3;

/// Source of the screen dimensions used by the edge heuristic.
pub trait ScreenGeometry: Send + Sync {
    fn screen_size(&self) -> Result<(u32, u32), SafetyError>;
}

#[derive(Clone, Copy, Debug)]
pub struct FixedScreen {
    pub width: u32,
    pub height: u32,
}

impl FixedScreen {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for FixedScreen {
    fn default() -> Self {
        Self::new(1920, 1080)
    }
}

impl ScreenGeometry for FixedScreen {
    fn screen_size(&self) -> Result<(u32, u32), SafetyError> {
        if self.width == 0 || self.height == 0 {
            return Err(SafetyError::Geometry(format!(
                "degenerate screen {}x{}",
                self.width, self.height
            )));
        }
        Ok((self.width, self.height))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SafetyConfig {
    pub require_confirmation_for_medium: bool,
    pub block_high_risk: bool,
    pub block_critical_risk: bool,
    pub edge_threshold_px: u32,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            require_confirmation_for_medium: true,
            block_high_risk: false,
            block_critical_risk: true,
            edge_threshold_px: 20,
        }
    }
}

impl From<&SafetyPolicy> for SafetyConfig {
    fn from(policy: &SafetyPolicy) -> Self {
        Self {
            require_confirmation_for_medium: policy.require_confirmation_for_medium,
            block_high_risk: policy.block_high_risk,
            block_critical_risk: policy.block_critical_risk,
            edge_threshold_px: policy.edge_threshold_px,
        }
    }
}

impl SafetyConfig {
    pub fn requires_confirmation(&self, risk: RiskLevel) -> bool {
        match risk {
            RiskLevel::Low => false,
            RiskLevel::Medium => self.require_confirmation_for_medium,
            RiskLevel::High | RiskLevel::Critical => true,
        }
    }

    pub fn blocks(&self, risk: RiskLevel) -> bool {
        match risk {
            RiskLevel::Critical => self.block_critical_risk,
            RiskLevel::High => self.block_high_risk,
            _ => false,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct SafetyAssessment {
    pub action_index: usize,
    pub action_type: ActionKind,
    pub risk_level: RiskLevel,
    pub triggered_rules: Vec<SafetyRule>,
    pub requires_confirmation: bool,
    pub block_execution: bool,
    pub warning_message: String,
    /// Set when the assessment itself failed and the fail-safe verdict was used.
    pub assessment_error: Option<String>,
    pub assessed_at: DateTime<Utc>,
    pub latency_ms: u64,
}

impl SafetyAssessment {
    pub fn rule_names(&self) -> Vec<&str> {
        self.triggered_rules
            .iter()
            .map(|rule| rule.name.as_str())
            .collect()
    }
}

/// Rules and thresholds pinned for the duration of one plan.
#[derive(Clone, Debug)]
pub struct AssessmentContext {
    pub rules: Arc<RuleSet>,
    pub config: SafetyConfig,
}

pub struct SafetyAssessor {
    rules: RwLock<Arc<RuleSet>>,
    config: RwLock<SafetyConfig>,
    geometry: Arc<dyn ScreenGeometry>,
    stats: Mutex<SafetyStats>,
}

impl Default for SafetyAssessor {
    fn default() -> Self {
        Self::new(SafetyConfig::default(), Arc::new(FixedScreen::default()))
    }
}

impl SafetyAssessor {
    pub fn new(config: SafetyConfig, geometry: Arc<dyn ScreenGeometry>) -> Self {
        Self {
            rules: RwLock::new(Arc::new(RuleSet::new())),
            config: RwLock::new(config),
            geometry,
            stats: Mutex::new(SafetyStats::default()),
        }
    }

    pub fn with_rules(self, rules: RuleSet) -> Self {
        *self.rules.write() = Arc::new(rules);
        self
    }

    pub fn context(&self) -> AssessmentContext {
        self.context_with(self.config.read().clone())
    }

    pub fn context_with(&self, config: SafetyConfig) -> AssessmentContext {
        AssessmentContext {
            rules: Arc::clone(&self.rules.read()),
            config,
        }
    }

    /// Mutates the registry. Contexts taken earlier keep their own copy.
    pub fn update_rules<R>(&self, edit: impl FnOnce(&mut RuleSet) -> R) -> R {
        let mut guard = self.rules.write();
        edit(Arc::make_mut(&mut guard))
    }

    pub fn add_custom_rule(&self, rule: SafetyRule) -> Result<(), SafetyError> {
        self.update_rules(|set| set.add_custom_rule(rule))
    }

    pub fn remove_custom_rule(&self, name: &str) -> bool {
        self.update_rules(|set| set.remove_custom_rule(name))
    }

    pub fn enable_rule(&self, name: &str) -> bool {
        self.update_rules(|set| set.enable_rule(name))
    }

    pub fn disable_rule(&self, name: &str) -> bool {
        self.update_rules(|set| set.disable_rule(name))
    }

    pub fn all_rules(&self) -> Vec<SafetyRule> {
        self.rules.read().all_rules().cloned().collect()
    }

    pub fn config(&self) -> SafetyConfig {
        self.config.read().clone()
    }

    pub fn update_config(&self, config: SafetyConfig) {
        debug!(?config, "safety config updated");
        *self.config.write() = config;
    }

    pub fn stats(&self) -> StatsReport {
        self.stats.lock().report()
    }

    pub fn reset_stats(&self) {
        *self.stats.lock() = SafetyStats::default();
    }

    pub fn assess(
        &self,
        action: &ActionPlan,
        action_index: usize,
        elements: &ElementSnapshot,
    ) -> SafetyAssessment {
        let ctx = self.context();
        self.assess_in(&ctx, action, action_index, elements)
    }

    /// Grades one action. Never fails: an internal error yields a HIGH-risk
    /// verdict that asks for confirmation without blocking.
    pub fn assess_in(
        &self,
        ctx: &AssessmentContext,
        action: &ActionPlan,
        action_index: usize,
        elements: &ElementSnapshot,
    ) -> SafetyAssessment {
        let started = Instant::now();
        let assessment = match self.triggered_rules(ctx, action, elements) {
            Ok(triggered) => {
                let risk_level = triggered
                    .iter()
                    .map(|rule| rule.risk_level)
                    .max()
                    .unwrap_or(RiskLevel::Low);
                let requires_confirmation = ctx.config.requires_confirmation(risk_level);
                let block_execution = ctx.config.blocks(risk_level);
                let warning_message = render_warning(action, &triggered, risk_level);
                SafetyAssessment {
                    action_index,
                    action_type: action.kind,
                    risk_level,
                    triggered_rules: triggered,
                    requires_confirmation,
                    block_execution,
                    warning_message,
                    assessment_error: None,
                    assessed_at: Utc::now(),
                    latency_ms: 0,
                }
            }
            Err(err) => {
                warn!(action_index, %err, "safety assessment failed, requiring confirmation");
                SafetyAssessment {
                    action_index,
                    action_type: action.kind,
                    risk_level: RiskLevel::High,
                    triggered_rules: Vec::new(),
                    requires_confirmation: true,
                    block_execution: false,
                    warning_message: format!(
                        "Safety assessment failed: {err}. Manual confirmation required."
                    ),
                    assessment_error: Some(err.to_string()),
                    assessed_at: Utc::now(),
                    latency_ms: 0,
                }
            }
        };

        self.stats
            .lock()
            .record(assessment.block_execution, assessment.requires_confirmation);

        debug!(
            action_index,
            risk = %assessment.risk_level,
            rules = ?assessment.rule_names(),
            confirm = assessment.requires_confirmation,
            block = assessment.block_execution,
            "action assessed"
        );

        SafetyAssessment {
            latency_ms: started.elapsed().as_millis() as u64,
            ..assessment
        }
    }

    fn triggered_rules(
        &self,
        ctx: &AssessmentContext,
        action: &ActionPlan,
        elements: &ElementSnapshot,
    ) -> Result<Vec<SafetyRule>, SafetyError> {
        let kind = action.kind;
        let mut triggered: Vec<&SafetyRule> = Vec::new();

        let joined_keys = match kind {
            ActionKind::Hotkey => Some(action.key_tokens().join("+")),
            _ => None,
        };
        let texts = [
            Some(action.description.as_str()),
            action.text.as_deref(),
            joined_keys.as_deref(),
        ];
        for text in texts.into_iter().flatten().filter(|text| !text.is_empty()) {
            for rule in ctx.rules.matching(kind, text) {
                push_unique(&mut triggered, rule);
            }
        }

        if let Some(coordinates) = action.parsed_coordinates()? {
            if let Some(rule) = ctx.rules.edge_rule(kind) {
                let (width, height) = self.geometry.screen_size()?;
                if near_edge(coordinates.anchor(), width, height, ctx.config.edge_threshold_px) {
                    push_unique(&mut triggered, rule);
                }
            }
        }

        if let Some(element) = action.element_id.as_deref().and_then(|id| elements.get(id)) {
            let element_texts = [Some(element.description.as_str()), element.text.as_deref()];
            for text in element_texts.into_iter().flatten().filter(|text| !text.is_empty()) {
                for rule in ctx.rules.matching(kind, text) {
                    push_unique(&mut triggered, rule);
                }
            }
        }

        Ok(triggered.into_iter().cloned().collect())
    }
}

fn push_unique<'a>(triggered: &mut Vec<&'a SafetyRule>, rule: &'a SafetyRule) {
    if triggered.iter().all(|existing| existing.name != rule.name) {
        debug!(rule = %rule.name, "safety rule triggered");
        triggered.push(rule);
    }
}

fn near_edge(point: Point, width: u32, height: u32, threshold: u32) -> bool {
    let (x, y) = (i64::from(point.x), i64::from(point.y));
    let (w, h, t) = (i64::from(width), i64::from(height), i64::from(threshold));
    x <= t || x >= w - t || y <= t || y >= h - t
}

fn render_warning(action: &ActionPlan, triggered: &[SafetyRule], risk: RiskLevel) -> String {
    if triggered.is_empty() {
        return String::new();
    }
    let mut lines = vec![format!("{risk} risk action detected:")];
    for rule in triggered.iter().take(MAX_LISTED_RULES) {
        lines.push(format!("• {}: {}", rule.name, rule.description));
    }
    if triggered.len() > MAX_LISTED_RULES {
        lines.push(format!(
            "• ... and {} more rules triggered",
            triggered.len() - MAX_LISTED_RULES
        ));
    }
    lines.push(String::new());
    lines.push("Action details:".to_string());
    lines.push(format!("• type: {}", action.kind));
    lines.push(format!("• description: {}", action.description));
    if let Some(text) = &action.text {
        lines.push(format!("• text: '{text}'"));
    }
    lines.join("\n")
}
