use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use deskpilot_policy_center::{
    ExecutionMode, InMemoryPolicyCenter, LoadOptions, PolicyCenter, RuntimeOverrideSpec,
};
use deskpilot_safety_broker::{load_rule_file, FixedScreen, SafetyAssessor, SafetyConfig};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const LOCAL_CONFIG: &str = "config/deskpilot.yaml";

pub fn init_logging(level: &str, debug: bool, json: bool) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string()));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}

/// Builds the policy center from defaults, the config file, and the environment.
pub fn load_policy(config_path: Option<&PathBuf>) -> Result<InMemoryPolicyCenter> {
    let options = match config_path {
        Some(path) => {
            if !path.exists() {
                bail!("Config file not found: {}", path.display());
            }
            info!("Loading policy from: {}", path.display());
            LoadOptions::with_path(path)
        }
        None => {
            let local = PathBuf::from(LOCAL_CONFIG);
            if local.exists() {
                info!("Loading policy from: {}", local.display());
                LoadOptions::with_path(local)
            } else {
                LoadOptions {
                    include_env: true,
                    include_cli_env: true,
                    ..LoadOptions::default()
                }
            }
        }
    };
    InMemoryPolicyCenter::from_options(options).context("Failed to load policy")
}

/// Assessor using the policy's screen size, with custom rules registered.
pub async fn build_assessor(
    policy: &InMemoryPolicyCenter,
    rules_path: Option<&PathBuf>,
) -> Result<Arc<SafetyAssessor>> {
    let snapshot = policy.snapshot().await;
    let screen = FixedScreen::new(snapshot.safety.screen_width, snapshot.safety.screen_height);
    let assessor = SafetyAssessor::new(SafetyConfig::from(&snapshot.safety), Arc::new(screen));

    if let Some(path) = rules_path {
        let file = load_rule_file(path)
            .with_context(|| format!("Failed to read rule file {}", path.display()))?;
        let disabled = file.disable.len();
        let added = assessor
            .update_rules(|set| file.apply_to(set))
            .with_context(|| format!("Failed to apply rule file {}", path.display()))?;
        info!(added, disabled, path = %path.display(), "custom rules loaded");
    }

    Ok(Arc::new(assessor))
}

/// Pins the execution mode for this invocation.
pub async fn apply_mode(policy: &InMemoryPolicyCenter, mode: ExecutionMode) -> Result<()> {
    let spec = RuntimeOverrideSpec {
        path: "execution.mode".to_string(),
        value: json!(mode.as_str()),
        owner: "cli".to_string(),
        reason: "--mode flag".to_string(),
        ttl_seconds: 0,
    };
    if let Err(err) = policy.apply_override(spec).await {
        warn!(%err, "mode override rejected");
        return Err(err).context("Failed to apply execution mode");
    }
    Ok(())
}
