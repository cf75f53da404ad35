use anyhow::Result;

use super::assess::cmd_assess;
use super::env::CliArgs;
use super::policy::cmd_policy;
use super::rules::cmd_rules;
use super::run::cmd_run;
use crate::cli::commands::Commands;
use crate::cli::context::CliContext;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Run(args) => cmd_run(args, ctx).await,
        Commands::Assess(args) => cmd_assess(args, ctx).await,
        Commands::Rules(args) => cmd_rules(args, ctx).await,
        Commands::Policy(args) => cmd_policy(args, ctx).await,
    }
}
