//! DeskPilot command-line host
//!
//! Exposes modules for integration testing

pub mod cli;
pub mod dry_run;
pub mod plan_file;

pub use dry_run::DryRunExecutor;
pub use plan_file::{load_elements, load_plan, PlanFile, PlanFileError};
