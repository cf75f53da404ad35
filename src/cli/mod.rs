pub mod app;
pub mod assess;
pub mod commands;
pub mod context;
pub mod dispatch;
pub mod env;
pub mod output;
pub mod policy;
pub mod rules;
pub mod run;
pub mod runtime;
