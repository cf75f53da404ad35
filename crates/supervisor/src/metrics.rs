use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Engine counters. Written by the worker, read by the status reporter.
#[derive(Debug, Default)]
pub struct SupervisorMetrics {
    tasks_started: AtomicU64,
    tasks_succeeded: AtomicU64,
    tasks_failed: AtomicU64,
    tasks_cancelled: AtomicU64,
    attempts: AtomicU64,
    actions_succeeded: AtomicU64,
    actions_failed: AtomicU64,
    actions_blocked: AtomicU64,
    retries: AtomicU64,
    confirmations_requested: AtomicU64,
    confirmations_declined: AtomicU64,
}

fn increment(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl SupervisorMetrics {
    pub fn record_task_started(&self) {
        increment(&self.tasks_started);
    }

    pub fn record_task_succeeded(&self) {
        increment(&self.tasks_succeeded);
    }

    pub fn record_task_failed(&self) {
        increment(&self.tasks_failed);
    }

    pub fn record_task_cancelled(&self) {
        increment(&self.tasks_cancelled);
    }

    pub fn record_attempt(&self) {
        increment(&self.attempts);
    }

    pub fn record_action(&self, succeeded: bool, retries: u32) {
        if succeeded {
            increment(&self.actions_succeeded);
        } else {
            increment(&self.actions_failed);
        }
        self.retries.fetch_add(u64::from(retries), Ordering::Relaxed);
    }

    pub fn record_blocked(&self) {
        increment(&self.actions_blocked);
    }

    pub fn record_confirmation(&self, approved: bool) {
        increment(&self.confirmations_requested);
        if !approved {
            increment(&self.confirmations_declined);
        }
    }

    pub fn snapshot(&self) -> SupervisorMetricsSnapshot {
        SupervisorMetricsSnapshot {
            tasks_started: self.tasks_started.load(Ordering::Relaxed),
            tasks_succeeded: self.tasks_succeeded.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            tasks_cancelled: self.tasks_cancelled.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
            actions_succeeded: self.actions_succeeded.load(Ordering::Relaxed),
            actions_failed: self.actions_failed.load(Ordering::Relaxed),
            actions_blocked: self.actions_blocked.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            confirmations_requested: self.confirmations_requested.load(Ordering::Relaxed),
            confirmations_declined: self.confirmations_declined.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SupervisorMetricsSnapshot {
    pub tasks_started: u64,
    pub tasks_succeeded: u64,
    pub tasks_failed: u64,
    pub tasks_cancelled: u64,
    pub attempts: u64,
    pub actions_succeeded: u64,
    pub actions_failed: u64,
    pub actions_blocked: u64,
    pub retries: u64,
    pub confirmations_requested: u64,
    pub confirmations_declined: u64,
}
