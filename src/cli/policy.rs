use anyhow::Result;
use clap::Args;
use deskpilot_policy_center::PolicyCenter;

use super::context::CliContext;
use super::output::{print_structured, OutputFormat};

#[derive(Args, Clone, Debug)]
pub struct PolicyArgs {
    /// Show where a dot-path value came from, e.g. execution.mode
    #[arg(long, value_name = "PATH")]
    pub source: Vec<String>,
}

pub async fn cmd_policy(args: PolicyArgs, ctx: &CliContext) -> Result<()> {
    let snapshot = ctx.policy().snapshot().await;

    for path in &args.source {
        match snapshot.source_of(path) {
            Some(source) => println!("{path}: {source:?}"),
            None => println!("{path}: unknown path"),
        }
    }
    if !args.source.is_empty() {
        return Ok(());
    }

    if print_structured(ctx.output_or(OutputFormat::Human), &*snapshot)? {
        return Ok(());
    }

    let execution = &snapshot.execution;
    println!("Policy Revision: {}", snapshot.rev);
    println!();
    println!(
        "Execution → mode={}, confirm_dangerous={}, strict={}, max_time_ms={}",
        execution.mode,
        execution.confirm_dangerous_actions,
        execution.strict_mode,
        execution.max_execution_time_ms
    );
    println!(
        "Retry → auto={}, max_retries={}, delay_ms={}",
        execution.auto_retry, execution.max_retries, execution.retry_delay_ms
    );
    println!(
        "Capture → enabled={}, settle_ms={}, validation={}",
        execution.capture_enabled, execution.settle_delay_ms, execution.enable_validation
    );
    let safety = &snapshot.safety;
    let sensitive: Vec<&str> = safety.sensitive_types.iter().map(|kind| kind.as_str()).collect();
    println!(
        "Safety → confirm_medium={}, block_high={}, block_critical={}, edge_px={}, screen={}x{}, sensitive=[{}]",
        safety.require_confirmation_for_medium,
        safety.block_high_risk,
        safety.block_critical_risk,
        safety.edge_threshold_px,
        safety.screen_width,
        safety.screen_height,
        sensitive.join(",")
    );
    println!(
        "Validation → tolerance_px={}, timeout_ms={}",
        snapshot.validation.pixel_tolerance_px, snapshot.validation.timeout_ms
    );
    println!(
        "Gate → timeout_ms={}  Supervisor → status_interval_ms={}, event_capacity={}",
        snapshot.gate.timeout_ms,
        snapshot.supervisor.status_interval_ms,
        snapshot.supervisor.event_capacity
    );
    Ok(())
}
