use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use deskpilot_action_flow::{ExecutionStatus, TaskExecutionResult};
use deskpilot_event_bus::to_mpsc;
use deskpilot_policy_center::{ExecutionMode, PolicyCenter};
use deskpilot_supervisor::{ExecutionEngine, SupervisorEvent};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::context::CliContext;
use super::output::{print_structured, OutputFormat};
use super::runtime::apply_mode;
use crate::dry_run::DryRunExecutor;
use crate::plan_file::{load_elements, load_plan};

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ModeArg {
    Manual,
    SemiAuto,
    FullAuto,
    StepByStep,
}

impl From<ModeArg> for ExecutionMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Manual => ExecutionMode::Manual,
            ModeArg::SemiAuto => ExecutionMode::SemiAuto,
            ModeArg::FullAuto => ExecutionMode::FullAuto,
            ModeArg::StepByStep => ExecutionMode::StepByStep,
        }
    }
}

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Plan file (JSON or YAML)
    #[arg(long, value_name = "FILE")]
    pub plan: PathBuf,

    /// Element snapshot merged with the plan's inline elements
    #[arg(long, value_name = "FILE")]
    pub elements: Option<PathBuf>,

    /// Override the configured execution mode
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Approve every confirmation request without prompting
    #[arg(long)]
    pub auto_approve: bool,

    /// Upper bound for dry-run waits in milliseconds
    #[arg(long, default_value_t = 5_000)]
    pub max_wait_ms: u64,
}

pub async fn cmd_run(args: RunArgs, ctx: &CliContext) -> Result<()> {
    let plan = load_plan(&args.plan)
        .with_context(|| format!("Failed to load plan {}", args.plan.display()))?;
    let extra = match &args.elements {
        Some(path) => load_elements(path)
            .with_context(|| format!("Failed to load elements {}", path.display()))?,
        None => Vec::new(),
    };
    if let Some(mode) = args.mode {
        apply_mode(ctx.policy(), mode.into()).await?;
    }
    let request = plan.into_request(extra);
    let format = ctx.output_or(OutputFormat::Human);

    let snapshot = ctx.policy().snapshot().await;
    let executor = Arc::new(
        DryRunExecutor::new().with_max_wait(Duration::from_millis(args.max_wait_ms)),
    );
    let engine = ExecutionEngine::builder(ctx.policy_center(), executor)
        .with_assessor(ctx.assessor())
        .with_event_capacity(snapshot.supervisor.event_capacity.max(16))
        .build();

    let events = to_mpsc(engine.bus(), snapshot.supervisor.event_capacity.max(16));
    let handle = engine
        .execute_plan(request)
        .await
        .context("Plan was not started")?;
    info!(task_id = %handle.task_id, mode = %snapshot.execution.mode, "running plan");

    let mut watcher = tokio::spawn(watch_events(
        engine.clone(),
        events,
        args.auto_approve,
        format == OutputFormat::Human,
    ));

    let wait = handle.wait();
    tokio::pin!(wait);
    let result = loop {
        tokio::select! {
            result = &mut wait => break result.context("Plan worker disappeared")?,
            signal = tokio::signal::ctrl_c() => {
                if let Err(err) = signal {
                    warn!(%err, "failed to listen for interrupt");
                }
                warn!("interrupt received, stopping plan");
                if let Err(err) = engine.stop() {
                    debug!(%err, "stop after completion");
                }
            }
        }
    };
    // Let the watcher print the tail of the run unless it sits in a prompt.
    if tokio::time::timeout(Duration::from_millis(200), &mut watcher)
        .await
        .is_err()
    {
        watcher.abort();
    }

    if !print_structured(format, &result)? {
        print_summary(&result);
    }
    if result.status != ExecutionStatus::Success {
        bail!(
            "plan {} finished with status {}",
            result.task_id,
            result.status
        );
    }
    Ok(())
}

async fn watch_events(
    engine: ExecutionEngine,
    mut events: mpsc::Receiver<SupervisorEvent>,
    auto_approve: bool,
    human: bool,
) {
    while let Some(event) = events.recv().await {
        match event {
            SupervisorEvent::ConfirmationRequested {
                action_index,
                action_type,
                risk_level,
                message,
                ..
            } => {
                let approved = if auto_approve {
                    info!(action_index, %action_type, %risk_level, "auto-approving action");
                    true
                } else {
                    prompt_confirmation(format!(
                        "[{risk_level}] action {action_index} ({action_type})\n{message}"
                    ))
                    .await
                };
                if !engine.confirm(action_index, approved) {
                    warn!(action_index, "confirmation arrived after the request closed");
                }
            }
            SupervisorEvent::ActionStarted {
                action_index,
                description,
                attempt,
                ..
            } if human => {
                println!("-> [{action_index}] {description} (attempt {attempt})");
            }
            SupervisorEvent::ActionCompleted { result, .. } if human => {
                match &result.error {
                    Some(error) => println!(
                        "   [{}] {} in {}ms: {}",
                        result.action_index, result.status, result.latency_ms, error
                    ),
                    None => println!(
                        "   [{}] {} in {}ms",
                        result.action_index, result.status, result.latency_ms
                    ),
                }
            }
            SupervisorEvent::Error {
                action_index,
                message,
                ..
            } => {
                warn!(?action_index, "{}", message);
            }
            SupervisorEvent::CompletionCheckRequested { prompt, .. } => {
                debug!(%prompt, "completion check prompt ready");
            }
            SupervisorEvent::Completed { .. } => break,
            _ => {}
        }
    }
}

/// Asks on the terminal. Anything but y/yes declines.
async fn prompt_confirmation(message: String) -> bool {
    let answer = tokio::task::spawn_blocking(move || {
        let mut stdout = io::stdout();
        if write!(stdout, "{message}\nProceed? [y/N] ")
            .and_then(|_| stdout.flush())
            .is_err()
        {
            return false;
        }
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(_) => matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
            Err(_) => false,
        }
    })
    .await;
    answer.unwrap_or(false)
}

fn print_summary(result: &TaskExecutionResult) {
    println!();
    println!("Task {} -> {}", result.task_id, result.status);
    println!(
        "Completed {}/{} actions ({:.0}%) in {}ms",
        result.completed_actions,
        result.total_actions,
        result.success_rate * 100.0,
        result.latency_ms
    );
    for (index, retries) in &result.retry_counts {
        println!("  action {index}: {retries} retries");
    }
    if let Some(error) = &result.final_error {
        println!("Error: {error}");
    }
}
