use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use deskpilot_core_types::{ActionPlan, ElementSnapshot};
use deskpilot_policy_center::PolicyCenter;
use deskpilot_safety_broker::{SafetyAssessment, SafetyConfig};
use deskpilot_supervisor::needs_confirmation;
use serde::Serialize;

use super::context::CliContext;
use super::output::{print_structured, OutputFormat};
use crate::plan_file::{load_elements, load_plan};

#[derive(Args, Clone, Debug)]
pub struct AssessArgs {
    /// Plan file (JSON or YAML)
    #[arg(long, value_name = "FILE")]
    pub plan: PathBuf,

    /// Element snapshot merged with the plan's inline elements
    #[arg(long, value_name = "FILE")]
    pub elements: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateVerdict {
    Auto,
    Confirm,
    Block,
}

impl GateVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateVerdict::Auto => "auto",
            GateVerdict::Confirm => "confirm",
            GateVerdict::Block => "block",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AssessedAction {
    pub description: String,
    /// What the engine would do under the current mode.
    pub verdict: GateVerdict,
    #[serde(flatten)]
    pub assessment: SafetyAssessment,
}

pub async fn cmd_assess(args: AssessArgs, ctx: &CliContext) -> Result<()> {
    let plan = load_plan(&args.plan)
        .with_context(|| format!("Failed to load plan {}", args.plan.display()))?;
    let extra = match &args.elements {
        Some(path) => load_elements(path)
            .with_context(|| format!("Failed to load elements {}", path.display()))?,
        None => Vec::new(),
    };
    let request = plan.into_request(extra);
    let assessed = assess_plan(ctx, &request.actions, &request.elements).await;

    if !print_structured(ctx.output_or(OutputFormat::Json), &assessed)? {
        for (index, row) in assessed.iter().enumerate() {
            let rules = row.assessment.rule_names().join(", ");
            println!(
                "[{index}] {:<8} {:<7} {} {}",
                row.assessment.risk_level.as_str(),
                row.verdict.as_str(),
                row.assessment.action_type,
                row.description
            );
            if !rules.is_empty() {
                println!("      rules: {rules}");
            }
        }
    }
    Ok(())
}

pub async fn assess_plan(
    ctx: &CliContext,
    actions: &[ActionPlan],
    elements: &ElementSnapshot,
) -> Vec<AssessedAction> {
    let snapshot = ctx.policy().snapshot().await;
    let assessor = ctx.assessor();
    let pinned = assessor.context_with(SafetyConfig::from(&snapshot.safety));

    actions
        .iter()
        .enumerate()
        .map(|(index, action)| {
            let assessment = assessor.assess_in(&pinned, action, index, elements);
            let verdict = if assessment.block_execution {
                GateVerdict::Block
            } else if needs_confirmation(&snapshot.execution, &snapshot.safety, action.kind, &assessment)
            {
                GateVerdict::Confirm
            } else {
                GateVerdict::Auto
            };
            AssessedAction {
                description: action.description.clone(),
                verdict,
                assessment,
            }
        })
        .collect()
}
