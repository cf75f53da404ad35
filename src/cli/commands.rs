use clap::Subcommand;

use super::assess::AssessArgs;
use super::policy::PolicyArgs;
use super::rules::RulesArgs;
use super::run::RunArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Execute a plan against the dry-run executor
    Run(RunArgs),

    /// Grade every action of a plan without executing it
    Assess(AssessArgs),

    /// List the risk rules in effect
    Rules(RulesArgs),

    /// Show the effective execution policy
    Policy(PolicyArgs),
}
