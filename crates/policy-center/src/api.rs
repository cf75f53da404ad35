use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deskpilot_core_types::ActionKind;
use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::errors::PolicyError;
use crate::loader::{load_snapshot_with_options, normalize_override, LoadOptions};
use crate::model::{ExecutionMode, PolicySnapshot, PolicySource, RuntimeOverrideSpec};
use crate::override_store::RuntimeOverrideStore;

#[async_trait]
pub trait PolicyCenter: Send + Sync {
    async fn snapshot(&self) -> Arc<PolicySnapshot>;
    async fn reload(&self) -> Result<(), PolicyError>;
    async fn apply_override(&self, override_spec: RuntimeOverrideSpec) -> Result<(), PolicyError>;
    fn subscribe(&self) -> watch::Receiver<Arc<PolicySnapshot>>;
    async fn guard(&self) -> PolicyGuard;
}

struct PolicyState {
    base: PolicySnapshot,
    snapshot: PolicySnapshot,
    overrides: RuntimeOverrideStore,
    rev_counter: u64,
}

impl PolicyState {
    fn new(base: PolicySnapshot) -> Self {
        let rev_counter = base.rev;
        Self {
            base: base.clone(),
            snapshot: base,
            overrides: RuntimeOverrideStore::default(),
            rev_counter,
        }
    }

    fn apply_active_overrides(&mut self) -> Result<(), PolicyError> {
        let mut new_snapshot = self.base.clone();
        let entries = self.overrides.active_entries();
        for (path, value) in entries {
            apply_override_to_snapshot(
                &mut new_snapshot,
                &path,
                &value,
                PolicySource::RuntimeOverride,
            )?;
        }
        self.rev_counter = self.rev_counter.saturating_add(1);
        new_snapshot.rev = self.rev_counter;
        self.snapshot = new_snapshot;
        Ok(())
    }
}

pub struct InMemoryPolicyCenter {
    state: Arc<Mutex<PolicyState>>,
    watch_tx: watch::Sender<Arc<PolicySnapshot>>,
    source: Option<LoadOptions>,
}

impl InMemoryPolicyCenter {
    pub fn new(snapshot: PolicySnapshot) -> Self {
        let state = PolicyState::new(snapshot);
        let current_snapshot = Arc::new(state.snapshot.clone());
        let (watch_tx, _watch_rx) = watch::channel(current_snapshot);
        Self {
            state: Arc::new(Mutex::new(state)),
            watch_tx,
            source: None,
        }
    }

    /// Builds the center from the layered loader and remembers the options so
    /// `reload` can re-read the same sources.
    pub fn from_options(options: LoadOptions) -> Result<Self, PolicyError> {
        let snapshot = load_snapshot_with_options(&options)?;
        let mut center = Self::new(snapshot);
        center.source = Some(options);
        Ok(center)
    }
}

#[async_trait]
impl PolicyCenter for InMemoryPolicyCenter {
    async fn snapshot(&self) -> Arc<PolicySnapshot> {
        let guard = self.state.lock().await;
        Arc::new(guard.snapshot.clone())
    }

    async fn reload(&self) -> Result<(), PolicyError> {
        let Some(options) = self.source.as_ref() else {
            return Err(PolicyError::Invalid(
                "policy center was not built from a loader".into(),
            ));
        };
        let fresh = load_snapshot_with_options(options)?;
        let mut guard = self.state.lock().await;
        guard.base = fresh;
        guard.apply_active_overrides()?;
        let snapshot = Arc::new(guard.snapshot.clone());
        drop(guard);
        info!(rev = snapshot.rev, "policy reloaded");
        let _ = self.watch_tx.send(snapshot);
        Ok(())
    }

    async fn apply_override(&self, override_spec: RuntimeOverrideSpec) -> Result<(), PolicyError> {
        let ttl = if override_spec.ttl_seconds > 0 {
            Some(Duration::from_secs(override_spec.ttl_seconds))
        } else {
            None
        };
        let (path, value) = normalize_override(&override_spec.path, override_spec.value.clone())?;
        let mut guard = self.state.lock().await;
        guard
            .overrides
            .insert(path.clone(), value, override_spec.owner.clone(), ttl);
        if let Err(err) = guard.apply_active_overrides() {
            guard.overrides.remove(&path);
            return Err(err);
        }
        let snapshot = Arc::new(guard.snapshot.clone());
        drop(guard);

        info!(
            path = %path,
            owner = %override_spec.owner,
            reason = %override_spec.reason,
            "policy override applied"
        );
        let _ = self.watch_tx.send(snapshot.clone());

        if let Some(ttl) = ttl {
            let state = Arc::clone(&self.state);
            let watch_tx = self.watch_tx.clone();
            tokio::spawn(async move {
                sleep(ttl).await;
                let mut guard = state.lock().await;
                if guard.overrides.remove(&path) {
                    match guard.apply_active_overrides() {
                        Ok(()) => {
                            let snapshot = Arc::new(guard.snapshot.clone());
                            drop(guard);
                            if watch_tx.send(snapshot).is_err() {
                                warn!("policy override expiry broadcast had no listeners");
                            }
                        }
                        Err(err) => {
                            warn!("policy override expiry recompute failed: {err}");
                        }
                    }
                }
            });
        }

        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<Arc<PolicySnapshot>> {
        self.watch_tx.subscribe()
    }

    async fn guard(&self) -> PolicyGuard {
        let snapshot = self.snapshot().await;
        PolicyGuard { snapshot }
    }
}

/// Sticky view of one policy revision. The engine holds one for the
/// lifetime of a task so later overrides only affect the next task.
#[derive(Clone, Debug)]
pub struct PolicyGuard {
    snapshot: Arc<PolicySnapshot>,
}

impl PolicyGuard {
    pub fn new(snapshot: Arc<PolicySnapshot>) -> Self {
        Self { snapshot }
    }

    pub fn revision(&self) -> u64 {
        self.snapshot.rev
    }

    pub fn snapshot(&self) -> Arc<PolicySnapshot> {
        Arc::clone(&self.snapshot)
    }
}

pub(crate) fn apply_override_to_snapshot(
    snapshot: &mut PolicySnapshot,
    path: &str,
    value: &Value,
    source: PolicySource,
) -> Result<(), PolicyError> {
    let changed = match path {
        "execution.mode" => merge(&mut snapshot.execution.mode, to_mode(value)?),
        "execution.confirm_dangerous_actions" => merge(
            &mut snapshot.execution.confirm_dangerous_actions,
            to_bool(value)?,
        ),
        "execution.max_execution_time_ms" => merge(
            &mut snapshot.execution.max_execution_time_ms,
            to_u64(value)?,
        ),
        "execution.strict_mode" => merge(&mut snapshot.execution.strict_mode, to_bool(value)?),
        "execution.auto_retry" => merge(&mut snapshot.execution.auto_retry, to_bool(value)?),
        "execution.max_retries" => merge(&mut snapshot.execution.max_retries, to_u32(value)?),
        "execution.retry_delay_ms" => merge(&mut snapshot.execution.retry_delay_ms, to_u64(value)?),
        "execution.capture_enabled" => {
            merge(&mut snapshot.execution.capture_enabled, to_bool(value)?)
        }
        "execution.settle_delay_ms" => {
            merge(&mut snapshot.execution.settle_delay_ms, to_u64(value)?)
        }
        "execution.enable_validation" => {
            merge(&mut snapshot.execution.enable_validation, to_bool(value)?)
        }
        "safety.require_confirmation_for_medium" => merge(
            &mut snapshot.safety.require_confirmation_for_medium,
            to_bool(value)?,
        ),
        "safety.block_high_risk" => merge(&mut snapshot.safety.block_high_risk, to_bool(value)?),
        "safety.block_critical_risk" => {
            merge(&mut snapshot.safety.block_critical_risk, to_bool(value)?)
        }
        "safety.edge_threshold_px" => merge(&mut snapshot.safety.edge_threshold_px, to_u32(value)?),
        "safety.screen_width" => merge(&mut snapshot.safety.screen_width, to_u32(value)?),
        "safety.screen_height" => merge(&mut snapshot.safety.screen_height, to_u32(value)?),
        "safety.sensitive_types" => {
            merge(&mut snapshot.safety.sensitive_types, to_kinds(value)?)
        }
        "validation.pixel_tolerance_px" => merge(
            &mut snapshot.validation.pixel_tolerance_px,
            to_u32(value)?,
        ),
        "validation.timeout_ms" => merge(&mut snapshot.validation.timeout_ms, to_u64(value)?),
        "gate.timeout_ms" => merge(&mut snapshot.gate.timeout_ms, to_u64(value)?),
        "supervisor.status_interval_ms" => merge(
            &mut snapshot.supervisor.status_interval_ms,
            to_u64(value)?,
        ),
        "supervisor.event_capacity" => merge(
            &mut snapshot.supervisor.event_capacity,
            to_u64(value)? as usize,
        ),
        path => return Err(PolicyError::UnsupportedPath(path.to_string())),
    };
    if changed || matches!(source, PolicySource::Builtin) {
        snapshot.set_provenance(path, source);
    }
    Ok(())
}

fn merge<T: PartialEq>(target: &mut T, candidate: T) -> bool {
    if *target == candidate {
        return false;
    }
    *target = candidate;
    true
}

fn to_u64(value: &Value) -> Result<u64, PolicyError> {
    value
        .as_u64()
        .ok_or_else(|| PolicyError::InvalidValue(format!("expected non-negative integer, got {value}")))
}

fn to_u32(value: &Value) -> Result<u32, PolicyError> {
    to_u64(value).and_then(|v| {
        u32::try_from(v).map_err(|_| PolicyError::InvalidValue(format!("value {v} exceeds u32")))
    })
}

fn to_bool(value: &Value) -> Result<bool, PolicyError> {
    value
        .as_bool()
        .ok_or_else(|| PolicyError::InvalidValue(format!("expected bool, got {value}")))
}

fn to_mode(value: &Value) -> Result<ExecutionMode, PolicyError> {
    value
        .as_str()
        .ok_or_else(|| PolicyError::InvalidValue(format!("expected mode string, got {value}")))?
        .parse()
}

fn to_kinds(value: &Value) -> Result<Vec<ActionKind>, PolicyError> {
    let parse = |raw: &str| {
        raw.parse::<ActionKind>()
            .map_err(|err| PolicyError::InvalidValue(err.to_string()))
    };
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .ok_or_else(|| {
                        PolicyError::InvalidValue(format!("expected action type, got {item}"))
                    })
                    .and_then(parse)
            })
            .collect(),
        Value::String(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(parse)
            .collect(),
        Value::Null => Ok(Vec::new()),
        other => Err(PolicyError::InvalidValue(format!(
            "expected list of action types, got {other}"
        ))),
    }
}
