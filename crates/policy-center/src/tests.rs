use crate::api::{InMemoryPolicyCenter, PolicyCenter};
use crate::defaults::default_snapshot;
use crate::loader::{load_snapshot, LoadOptions};
use crate::model::{ExecutionMode, PolicySource, RuntimeOverrideSpec};
use deskpilot_core_types::ActionKind;
use std::env;
use std::sync::{Arc, Mutex, OnceLock};

fn override_spec(path: &str, value: serde_json::Value) -> RuntimeOverrideSpec {
    RuntimeOverrideSpec {
        path: path.into(),
        value,
        owner: "test".into(),
        reason: "unit test".into(),
        ttl_seconds: 0,
    }
}

#[test]
fn default_snapshot_matches_documented_defaults() {
    let snapshot = default_snapshot();
    assert_eq!(snapshot.execution.mode, ExecutionMode::SemiAuto);
    assert_eq!(snapshot.execution.max_retries, 2);
    assert_eq!(snapshot.execution.retry_delay_ms, 1_000);
    assert!(snapshot.safety.block_critical_risk);
    assert!(!snapshot.safety.block_high_risk);
    assert_eq!(snapshot.gate.timeout_ms, 30_000);
    assert_eq!(
        snapshot.safety.sensitive_types,
        vec![ActionKind::Drag, ActionKind::Key, ActionKind::Hotkey]
    );
}

#[test]
fn retry_budget_is_zero_without_auto_retry() {
    let mut config = default_snapshot().execution;
    assert_eq!(config.retry_budget(), 2);
    config.auto_retry = false;
    assert_eq!(config.retry_budget(), 0);
}

#[test]
fn load_snapshot_applies_yaml_file() {
    let _guard = env_guard().lock().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("policy.yaml");
    std::fs::write(
        &file_path,
        r#"execution:
  mode: FULL_AUTO
  strict_mode: true
  max_retries: 4
safety:
  block_high_risk: true
  sensitive_types: [drag]
gate:
  timeout_ms: 5000
"#,
    )
    .unwrap();

    let snapshot = load_snapshot(Some(&file_path)).unwrap();
    assert_eq!(snapshot.execution.mode, ExecutionMode::FullAuto);
    assert!(snapshot.execution.strict_mode);
    assert_eq!(snapshot.execution.max_retries, 4);
    assert!(snapshot.safety.block_high_risk);
    assert_eq!(snapshot.safety.sensitive_types, vec![ActionKind::Drag]);
    assert_eq!(snapshot.gate.timeout_ms, 5_000);
    assert_eq!(snapshot.source_of("execution.mode"), Some(PolicySource::File));
    assert_eq!(
        snapshot.source_of("execution.auto_retry"),
        Some(PolicySource::Builtin)
    );
}

#[test]
fn unknown_path_in_file_is_rejected() {
    let _guard = env_guard().lock().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("policy.yaml");
    std::fs::write(&file_path, "execution:\n  turbo: true\n").unwrap();
    assert!(load_snapshot(Some(&file_path)).is_err());
}

#[tokio::test]
async fn override_updates_snapshot() {
    let center = InMemoryPolicyCenter::new(default_snapshot());
    PolicyCenter::apply_override(&center, override_spec("execution.max_retries", serde_json::json!(5)))
        .await
        .unwrap();
    let snapshot = PolicyCenter::snapshot(&center).await;
    assert_eq!(snapshot.execution.max_retries, 5);
    assert_eq!(
        snapshot.source_of("execution.max_retries"),
        Some(PolicySource::RuntimeOverride)
    );
}

#[tokio::test]
async fn invalid_override_leaves_snapshot_untouched() {
    let center = InMemoryPolicyCenter::new(default_snapshot());
    let before = PolicyCenter::snapshot(&center).await.rev;
    let result = PolicyCenter::apply_override(
        &center,
        override_spec("execution.mode", serde_json::json!("WARP_SPEED")),
    )
    .await;
    assert!(result.is_err());
    let after = PolicyCenter::snapshot(&center).await;
    assert_eq!(after.rev, before);
    assert_eq!(after.execution.mode, ExecutionMode::SemiAuto);
}

#[tokio::test]
async fn subscribe_streams_updates() {
    let center = InMemoryPolicyCenter::new(default_snapshot());
    let mut rx = PolicyCenter::subscribe(&center);
    let original_rev = rx.borrow().rev;

    PolicyCenter::apply_override(&center, override_spec("execution.mode", serde_json::json!("manual")))
        .await
        .unwrap();
    rx.changed().await.unwrap();
    let snapshot = Arc::clone(&rx.borrow());
    assert_ne!((*snapshot).rev, original_rev);
    assert_eq!((*snapshot).execution.mode, ExecutionMode::Manual);
}

#[tokio::test]
async fn guard_keeps_revision_across_overrides() {
    let center = InMemoryPolicyCenter::new(default_snapshot());
    let guard = center.guard().await;
    PolicyCenter::apply_override(&center, override_spec("execution.strict_mode", serde_json::json!(true)))
        .await
        .unwrap();
    let pinned = guard.snapshot();
    assert_eq!(guard.revision(), pinned.rev);
    assert!(!pinned.execution.strict_mode);
    assert!(PolicyCenter::snapshot(&center).await.execution.strict_mode);
}

#[tokio::test]
async fn reload_requires_loader_source() {
    let center = InMemoryPolicyCenter::new(default_snapshot());
    assert!(PolicyCenter::reload(&center).await.is_err());
}

#[tokio::test]
async fn reload_rereads_file_and_keeps_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("policy.yaml");
    std::fs::write(&file_path, "execution:\n  max_retries: 3\n").unwrap();
    let options = LoadOptions {
        paths: vec![file_path.clone()],
        include_env: false,
        include_cli_env: false,
    };
    let center = InMemoryPolicyCenter::from_options(options).unwrap();
    PolicyCenter::apply_override(&center, override_spec("execution.strict_mode", serde_json::json!(true)))
        .await
        .unwrap();

    std::fs::write(&file_path, "execution:\n  max_retries: 1\n").unwrap();
    PolicyCenter::reload(&center).await.unwrap();
    let snapshot = PolicyCenter::snapshot(&center).await;
    assert_eq!(snapshot.execution.max_retries, 1);
    assert!(snapshot.execution.strict_mode);
}

#[test]
fn env_layer_overrides_defaults() {
    let _guard = env_guard().lock().unwrap();
    let key = "DESKPILOT_POLICY__EXECUTION__MAX_RETRIES";
    env::set_var(key, "4");
    let snapshot = load_snapshot(None).expect("load snapshot");
    env::remove_var(key);
    assert_eq!(snapshot.execution.max_retries, 4);
    assert_eq!(
        snapshot.source_of("execution.max_retries"),
        Some(PolicySource::Env)
    );
}

#[test]
fn cli_overrides_replace_and_record_provenance() {
    let _guard = env_guard().lock().unwrap();
    env::set_var(
        "DESKPILOT_POLICY_CLI_OVERRIDES",
        "execution.mode=STEP_BY_STEP,safety.sensitive_types=drag;key",
    );
    let result = load_snapshot(None);
    env::remove_var("DESKPILOT_POLICY_CLI_OVERRIDES");
    // `;` is not a list separator, so the second entry is rejected.
    assert!(result.is_err());

    env::set_var(
        "DESKPILOT_POLICY_CLI_OVERRIDES",
        "execution.mode=STEP_BY_STEP,execution.auto_retry=false",
    );
    let snapshot = load_snapshot(None).expect("load snapshot with cli");
    env::remove_var("DESKPILOT_POLICY_CLI_OVERRIDES");
    assert_eq!(snapshot.execution.mode, ExecutionMode::StepByStep);
    assert!(!snapshot.execution.auto_retry);
    assert_eq!(
        snapshot.source_of("execution.mode"),
        Some(PolicySource::Cli)
    );
}

#[test]
fn loose_env_and_cli_values_are_coerced() {
    let _guard = env_guard().lock().unwrap();
    env::set_var("DESKPILOT_POLICY__GATE__TIMEOUT_MS", "2s");
    env::set_var("DESKPILOT_POLICY__EXECUTION__STRICT_MODE", "on");
    env::set_var(
        "DESKPILOT_POLICY_CLI_OVERRIDES",
        "safety.sensitive_types=drag,hotkey,execution.mode=full-auto",
    );
    let result = load_snapshot(None);
    env::remove_var("DESKPILOT_POLICY__GATE__TIMEOUT_MS");
    env::remove_var("DESKPILOT_POLICY__EXECUTION__STRICT_MODE");
    env::remove_var("DESKPILOT_POLICY_CLI_OVERRIDES");

    let snapshot = result.expect("load snapshot");
    assert_eq!(snapshot.gate.timeout_ms, 2_000);
    assert!(snapshot.execution.strict_mode);
    assert_eq!(
        snapshot.safety.sensitive_types,
        vec![ActionKind::Drag, ActionKind::Hotkey]
    );
    assert_eq!(snapshot.execution.mode, ExecutionMode::FullAuto);
    assert_eq!(snapshot.source_of("gate.timeout_ms"), Some(PolicySource::Env));
}

#[test]
fn invalid_mode_in_file_names_the_file() {
    let _guard = env_guard().lock().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("policy.yaml");
    std::fs::write(&file_path, "execution:\n  mode: WARP_SPEED\n").unwrap();
    let message = load_snapshot(Some(&file_path)).unwrap_err().to_string();
    assert!(message.contains("execution.mode"), "{message}");
    assert!(message.contains("policy.yaml"), "{message}");
}

#[tokio::test]
async fn runtime_override_accepts_duration_suffix() {
    let center = InMemoryPolicyCenter::new(default_snapshot());
    PolicyCenter::apply_override(&center, override_spec("Gate.Timeout_Ms", serde_json::json!("750ms")))
        .await
        .unwrap();
    let snapshot = PolicyCenter::snapshot(&center).await;
    assert_eq!(snapshot.gate.timeout_ms, 750);
    assert_eq!(
        snapshot.source_of("gate.timeout_ms"),
        Some(PolicySource::RuntimeOverride)
    );
}

fn env_guard() -> &'static Mutex<()> {
    static ENV_GUARD: OnceLock<Mutex<()>> = OnceLock::new();
    ENV_GUARD.get_or_init(|| Mutex::new(()))
}
