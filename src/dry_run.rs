//! Executor that logs the primitive it would perform instead of touching the desktop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use deskpilot_action_flow::{ActionExecutor, FlowError, Platform};
use deskpilot_core_types::{ActionKind, ActionPlan, Point, ResolvedTarget};
use parking_lot::Mutex;
use tracing::info;

const DEFAULT_WAIT_SECS: f64 = 1.0;

pub struct DryRunExecutor {
    platform: Platform,
    max_wait: Duration,
    pointer: Mutex<Option<Point>>,
    dispatched: AtomicU64,
}

impl Default for DryRunExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl DryRunExecutor {
    pub fn new() -> Self {
        Self {
            platform: Platform::current(),
            max_wait: Duration::from_secs(5),
            pointer: Mutex::new(None),
            dispatched: AtomicU64::new(0),
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Upper bound for `wait` actions.
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Key combination as it would be sent on this platform.
    pub fn key_combo(&self, action: &ActionPlan) -> String {
        let tokens = action.key_tokens();
        self.platform
            .map_keys(tokens.iter().map(String::as_str))
            .join("+")
    }

    fn wait_for(&self, action: &ActionPlan) -> Duration {
        let seconds = action
            .duration
            .filter(|secs| secs.is_finite())
            .unwrap_or(DEFAULT_WAIT_SECS)
            .max(0.0);
        Duration::from_secs_f64(seconds).min(self.max_wait)
    }
}

#[async_trait]
impl ActionExecutor for DryRunExecutor {
    async fn execute(&self, action: &ActionPlan, target: &ResolvedTarget) -> Result<bool, FlowError> {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        match action.kind {
            ActionKind::Wait => {
                let wait = self.wait_for(action);
                info!(wait_ms = wait.as_millis() as u64, "dry-run: wait");
                tokio::time::sleep(wait).await;
            }
            ActionKind::Key | ActionKind::Hotkey => {
                info!(
                    kind = %action.kind,
                    combo = %self.key_combo(action),
                    platform = ?self.platform,
                    "dry-run: press keys"
                );
            }
            ActionKind::Type => {
                let chars = action.text.as_deref().map_or(0, |text| text.chars().count());
                info!(chars, "dry-run: type text");
            }
            ActionKind::Scroll => {
                info!(clicks = action.clicks.unwrap_or(0), ?target, "dry-run: scroll");
            }
            kind => {
                info!(%kind, ?target, description = %action.description, "dry-run: pointer action");
            }
        }
        if let Some(point) = target.expected_pointer() {
            *self.pointer.lock() = Some(point);
        }
        Ok(true)
    }

    async fn pointer_position(&self) -> Option<Point> {
        *self.pointer.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_hotkeys_for_platform() {
        let executor = DryRunExecutor::new().with_platform(Platform::Macos);
        let hotkey = ActionPlan::new(ActionKind::Hotkey, "copy").with_keys(["Ctrl", "c"]);
        assert_eq!(executor.key_combo(&hotkey), "command+c");

        let executor = DryRunExecutor::new().with_platform(Platform::Linux);
        let key = ActionPlan::new(ActionKind::Key, "launcher").with_text("win+r");
        assert_eq!(executor.key_combo(&key), "super+r");
    }

    #[tokio::test]
    async fn remembers_pointer_after_click() {
        let executor = DryRunExecutor::new();
        assert!(executor.pointer_position().await.is_none());

        let click = ActionPlan::new(ActionKind::Click, "ok").with_coordinates(vec![40, 50]);
        let target = ResolvedTarget::At(Point::new(40, 50));
        assert!(executor.execute(&click, &target).await.unwrap());
        assert_eq!(executor.pointer_position().await, Some(Point::new(40, 50)));
        assert_eq!(executor.dispatched(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_are_capped() {
        let executor = DryRunExecutor::new().with_max_wait(Duration::from_millis(200));
        let wait = ActionPlan::new(ActionKind::Wait, "long pause").with_duration(3600.0);
        assert_eq!(executor.wait_for(&wait), Duration::from_millis(200));

        let started = tokio::time::Instant::now();
        executor.execute(&wait, &ResolvedTarget::Nowhere).await.unwrap();
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_secs(1));
    }
}
