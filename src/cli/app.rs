use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use super::context::CliContext;
use super::dispatch::dispatch;
use super::env::CliArgs;
use super::runtime::{build_assessor, init_logging, load_policy};

pub async fn run() -> Result<()> {
    let cli = CliArgs::parse();

    init_logging(&cli.log_level, cli.debug, cli.json_logs)?;
    info!("Starting DeskPilot v{}", env!("CARGO_PKG_VERSION"));

    let policy = load_policy(cli.config.as_ref())?;
    let assessor = build_assessor(&policy, cli.rules.as_ref()).await?;
    let ctx = CliContext::new(policy, assessor, cli.output);

    match dispatch(&cli, &ctx).await {
        Ok(()) => {
            info!("Command completed successfully");
            Ok(())
        }
        Err(err) => {
            error!("Command failed: {}", err);
            Err(err)
        }
    }
}
