use anyhow::Result;
use clap::Args;
use deskpilot_safety_broker::{RuleOrigin, SafetyRule};

use super::context::CliContext;
use super::output::{print_structured, OutputFormat};

#[derive(Args, Clone, Debug)]
pub struct RulesArgs {
    /// Only list rules registered from a rule file
    #[arg(long)]
    pub custom_only: bool,

    /// Include disabled rules
    #[arg(long)]
    pub all: bool,
}

pub async fn cmd_rules(args: RulesArgs, ctx: &CliContext) -> Result<()> {
    let rules: Vec<SafetyRule> = ctx
        .assessor()
        .all_rules()
        .into_iter()
        .filter(|rule| !args.custom_only || rule.origin == RuleOrigin::Custom)
        .filter(|rule| args.all || rule.enabled)
        .collect();

    if print_structured(ctx.output_or(OutputFormat::Human), &rules)? {
        return Ok(());
    }

    println!("{} rules", rules.len());
    for rule in &rules {
        let applies: Vec<&str> = rule.applies_to.iter().map(|kind| kind.as_str()).collect();
        println!(
            "{:<22} {:<8} {:<8} [{}]{}",
            rule.name,
            rule.risk_level.as_str(),
            match rule.origin {
                RuleOrigin::Builtin => "builtin",
                RuleOrigin::Custom => "custom",
            },
            applies.join(","),
            if rule.enabled { "" } else { " (disabled)" }
        );
        println!("    {}: {}", rule.description, rule.pattern.source());
    }
    Ok(())
}
