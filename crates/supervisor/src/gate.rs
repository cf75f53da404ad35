use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How a confirmation request was resolved. Anything but `Approved` is a decline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateDecision {
    Approved,
    Declined,
    TimedOut,
    Cancelled,
}

impl GateDecision {
    pub fn is_approved(&self) -> bool {
        matches!(self, GateDecision::Approved)
    }
}

impl fmt::Display for GateDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            GateDecision::Approved => "approved",
            GateDecision::Declined => "declined by user",
            GateDecision::TimedOut => "confirmation timed out",
            GateDecision::Cancelled => "cancelled while awaiting confirmation",
        };
        f.write_str(text)
    }
}

/// Request/response handshake keyed by action index.
pub struct ConfirmationGate {
    pending: Mutex<HashMap<usize, oneshot::Sender<bool>>>,
}

impl Default for ConfirmationGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfirmationGate {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a pending request. The caller surfaces it, then awaits
    /// [`ConfirmationGate::wait`] with the returned receiver.
    pub fn open(&self, action_index: usize) -> oneshot::Receiver<bool> {
        let (tx, rx) = oneshot::channel();
        if self.pending.lock().insert(action_index, tx).is_some() {
            warn!(action_index, "replacing stale confirmation request");
        }
        rx
    }

    /// Delivers a response. Returns false when nothing is pending for `action_index`.
    pub fn respond(&self, action_index: usize, approved: bool) -> bool {
        match self.pending.lock().remove(&action_index) {
            Some(tx) => {
                info!(action_index, approved, "confirmation received");
                tx.send(approved).is_ok()
            }
            None => {
                debug!(action_index, "no confirmation pending for action");
                false
            }
        }
    }

    pub fn pending(&self) -> Option<usize> {
        self.pending.lock().keys().next().copied()
    }

    pub fn is_pending(&self, action_index: usize) -> bool {
        self.pending.lock().contains_key(&action_index)
    }

    /// Waits for the response, the timeout, or cancellation, whichever comes first.
    pub async fn wait(
        &self,
        action_index: usize,
        response: oneshot::Receiver<bool>,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> GateDecision {
        let decision = tokio::select! {
            _ = cancel.cancelled() => GateDecision::Cancelled,
            outcome = tokio::time::timeout(timeout, response) => match outcome {
                Ok(Ok(true)) => GateDecision::Approved,
                Ok(Ok(false)) => GateDecision::Declined,
                Ok(Err(_)) => GateDecision::Cancelled,
                Err(_) => GateDecision::TimedOut,
            },
        };
        self.pending.lock().remove(&action_index);
        if !decision.is_approved() {
            info!(action_index, %decision, "action not approved");
        }
        decision
    }

    /// Drops every pending request; waiters resolve as cancelled.
    pub fn cancel_all(&self) {
        self.pending.lock().clear();
    }
}
