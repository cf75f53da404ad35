//! Retry strategy

use crate::types::{ExecutionStatus, LoopConfig};
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// What to do after an attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Keep the attempt's result
    Stop,

    /// Run another attempt after a delay
    Retry { retry: u32, delay: Duration },
}

/// Fixed-delay retry policy
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt
    pub max_retries: u32,

    /// Delay between attempts
    pub delay: Duration,
}

impl RetryPolicy {
    /// Create a retry policy
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Policy that never retries
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Decide whether an attempt that ended with `status` is retried
    pub fn decide(&self, status: ExecutionStatus, retries_used: u32) -> RetryDecision {
        if status == ExecutionStatus::Success || retries_used >= self.max_retries {
            return RetryDecision::Stop;
        }
        RetryDecision::Retry {
            retry: retries_used + 1,
            delay: self.delay,
        }
    }

    /// Sleep for the retry delay; returns false if cancelled first
    pub async fn wait(&self, delay: Duration, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Retry delay interrupted by cancellation");
                false
            }
            _ = tokio::time::sleep(delay) => {
                debug!("Retry delay of {}ms elapsed", delay.as_millis());
                true
            }
        }
    }
}

impl From<&LoopConfig> for RetryPolicy {
    fn from(config: &LoopConfig) -> Self {
        Self::new(config.retry_budget, config.retry_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&LoopConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decide() {
        let policy = RetryPolicy::new(2, Duration::from_millis(100));

        assert_eq!(policy.decide(ExecutionStatus::Success, 0), RetryDecision::Stop);
        assert_eq!(
            policy.decide(ExecutionStatus::Failed, 0),
            RetryDecision::Retry {
                retry: 1,
                delay: Duration::from_millis(100)
            }
        );
        assert!(matches!(
            policy.decide(ExecutionStatus::Failed, 1),
            RetryDecision::Retry { retry: 2, .. }
        ));
        assert_eq!(policy.decide(ExecutionStatus::Failed, 2), RetryDecision::Stop);
    }

    #[test]
    fn test_no_retry_policy() {
        let policy = RetryPolicy::none();
        assert_eq!(policy.decide(ExecutionStatus::Failed, 0), RetryDecision::Stop);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_elapses() {
        let policy = RetryPolicy::default();
        let cancel = CancellationToken::new();
        assert!(policy.wait(policy.delay, &cancel).await);
    }

    #[tokio::test]
    async fn test_wait_cancelled() {
        let policy = RetryPolicy::new(1, Duration::from_secs(60));
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(!policy.wait(policy.delay, &cancel).await);
    }
}
