//! Post-action result validation
//!
//! This crate grades the outcome of one dispatched desktop action:
//! - Pointer-position checks against the resolved target
//! - Before/after capture comparison when no pointer signal exists
//! - Key-combination sanity checks
//! - Confidence scoring per outcome and action type
//! - Aggregated summaries over a task

pub mod errors;
pub mod scoring;
pub mod types;
pub mod validator;

pub use errors::*;
pub use scoring::*;
pub use types::*;
pub use validator::*;
