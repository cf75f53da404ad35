//! Shared primitives for the DeskPilot execution engine.
//!
//! Everything a plan carries across crate boundaries lives here: the action
//! plan itself, the UI element snapshot it refers to, screen geometry and the
//! identifiers used to correlate events with tasks.

mod action;
mod element;
mod geometry;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use action::{ActionKind, ActionPlan, ResolvedTarget};
pub use element::{ElementSnapshot, UIElement};
pub use geometry::{Coordinates, Point, Rect};

/// Shared error type for the DeskPilot crates.
#[derive(Debug, Error, Clone)]
pub enum DeskError {
    #[error("{message}")]
    Message { message: String },
    #[error("malformed coordinates: expected 2 or 4 values, got {0}")]
    MalformedCoordinates(usize),
    #[error("unresolved target: {0}")]
    UnresolvedTarget(String),
}

impl DeskError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new() -> Self {
        Self(format!("task_{}", Uuid::new_v4().simple()))
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Opaque reference to a captured screen state.
///
/// Handles are only comparable for equality; two captures of an unchanged
/// screen produce equal handles.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct CaptureHandle(pub String);

impl CaptureHandle {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for CaptureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
