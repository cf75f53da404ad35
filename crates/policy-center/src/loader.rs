//! Layered policy loading.
//!
//! Every layer is reduced to a list of `section.field` settings that are
//! checked against the `FIELDS` table and coerced to their canonical JSON form before
//! they touch the snapshot. Layers apply in order: built-in defaults, YAML
//! files, `DESKPILOT_POLICY__*` variables and `DESKPILOT_POLICY_OVERRIDE_JSON`,
//! then `DESKPILOT_POLICY_CLI_OVERRIDES`.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use deskpilot_core_types::ActionKind;
use serde_json::{Map, Value};
use tracing::debug;

use crate::api::apply_override_to_snapshot;
use crate::defaults::default_snapshot;
use crate::errors::PolicyError;
use crate::model::{ExecutionMode, PolicySnapshot, PolicySource};

pub const ENV_PREFIX: &str = "DESKPILOT_POLICY__";
pub const ENV_JSON: &str = "DESKPILOT_POLICY_OVERRIDE_JSON";
pub const ENV_CLI_OVERRIDES: &str = "DESKPILOT_POLICY_CLI_OVERRIDES";

/// Shape of a policy field, used to coerce loosely typed layers (env, CLI).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FieldKind {
    Flag,
    Count,
    /// Milliseconds; strings may be human durations such as `2s`.
    Millis,
    Mode,
    ActionKinds,
}

const FIELDS: &[(&str, FieldKind)] = &[
    ("execution.mode", FieldKind::Mode),
    ("execution.confirm_dangerous_actions", FieldKind::Flag),
    ("execution.max_execution_time_ms", FieldKind::Millis),
    ("execution.strict_mode", FieldKind::Flag),
    ("execution.auto_retry", FieldKind::Flag),
    ("execution.max_retries", FieldKind::Count),
    ("execution.retry_delay_ms", FieldKind::Millis),
    ("execution.capture_enabled", FieldKind::Flag),
    ("execution.settle_delay_ms", FieldKind::Millis),
    ("execution.enable_validation", FieldKind::Flag),
    ("safety.require_confirmation_for_medium", FieldKind::Flag),
    ("safety.block_high_risk", FieldKind::Flag),
    ("safety.block_critical_risk", FieldKind::Flag),
    ("safety.edge_threshold_px", FieldKind::Count),
    ("safety.screen_width", FieldKind::Count),
    ("safety.screen_height", FieldKind::Count),
    ("safety.sensitive_types", FieldKind::ActionKinds),
    ("validation.pixel_tolerance_px", FieldKind::Count),
    ("validation.timeout_ms", FieldKind::Millis),
    ("gate.timeout_ms", FieldKind::Millis),
    ("supervisor.status_interval_ms", FieldKind::Millis),
    ("supervisor.event_capacity", FieldKind::Count),
];

/// Sources layered on top of the built-in defaults, in order:
/// YAML files, `DESKPILOT_POLICY__*` variables, then CLI overrides.
#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub paths: Vec<PathBuf>,
    pub include_env: bool,
    pub include_cli_env: bool,
}

impl LoadOptions {
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            paths: vec![path.into()],
            include_env: true,
            include_cli_env: true,
        }
    }
}

pub fn load_snapshot(path: Option<&Path>) -> Result<PolicySnapshot, PolicyError> {
    let options = LoadOptions {
        paths: path.map(Path::to_path_buf).into_iter().collect(),
        include_env: true,
        include_cli_env: true,
    };
    load_snapshot_with_options(&options)
}

pub fn load_snapshot_with_options(options: &LoadOptions) -> Result<PolicySnapshot, PolicyError> {
    let mut snapshot = default_snapshot();
    for (path, _) in FIELDS {
        snapshot.set_provenance(path, PolicySource::Builtin);
    }

    for path in &options.paths {
        if !path.exists() {
            debug!(path = %path.display(), "policy file missing, skipped");
            continue;
        }
        apply_settings(&mut snapshot, settings_from_file(path)?)?;
    }
    if options.include_env {
        apply_settings(&mut snapshot, settings_from_env()?)?;
    }
    if options.include_cli_env {
        apply_settings(&mut snapshot, settings_from_cli_env()?)?;
    }
    Ok(snapshot)
}

/// Checks a runtime override against the field table and returns the path and
/// value in the form the snapshot stores.
pub(crate) fn normalize_override(path: &str, value: Value) -> Result<(String, Value), PolicyError> {
    let setting = Setting::new(path, value, PolicySource::RuntimeOverride, "runtime override")?;
    Ok((setting.path, setting.value))
}

#[derive(Debug)]
struct Setting {
    path: String,
    value: Value,
    source: PolicySource,
}

impl Setting {
    fn new(path: &str, value: Value, source: PolicySource, origin: &str) -> Result<Self, PolicyError> {
        let path = path.trim().to_ascii_lowercase();
        let kind = FIELDS
            .iter()
            .find(|(known, _)| *known == path)
            .map(|(_, kind)| *kind)
            .ok_or_else(|| PolicyError::UnsupportedPath(format!("{path} (from {origin})")))?;
        let value = coerce(kind, value)
            .map_err(|reason| PolicyError::InvalidValue(format!("{path} from {origin}: {reason}")))?;
        Ok(Self {
            path,
            value,
            source,
        })
    }
}

fn apply_settings(snapshot: &mut PolicySnapshot, settings: Vec<Setting>) -> Result<(), PolicyError> {
    for setting in settings {
        apply_override_to_snapshot(snapshot, &setting.path, &setting.value, setting.source)?;
    }
    Ok(())
}

fn settings_from_file(path: &Path) -> Result<Vec<Setting>, PolicyError> {
    let origin = path.display().to_string();
    let content = fs::read_to_string(path).map_err(|err| PolicyError::Io(format!("{origin}: {err}")))?;
    let document: Value = serde_yaml::from_str(&content)
        .map_err(|err| PolicyError::Invalid(format!("{origin}: {err}")))?;
    settings_from_document(document, PolicySource::File, &origin)
}

/// A policy document is a mapping of sections, each a flat mapping of fields.
fn settings_from_document(
    document: Value,
    source: PolicySource,
    origin: &str,
) -> Result<Vec<Setting>, PolicyError> {
    let sections = match document {
        Value::Null => return Ok(Vec::new()),
        Value::Object(sections) => sections,
        other => {
            return Err(PolicyError::Invalid(format!(
                "{origin}: expected a mapping of policy sections, got {other}"
            )))
        }
    };
    let mut settings = Vec::new();
    for (section, fields) in sections {
        let fields: Map<String, Value> = match fields {
            Value::Object(fields) => fields,
            Value::Null => continue,
            other => {
                return Err(PolicyError::Invalid(format!(
                    "{origin}: section `{section}` must be a mapping, got {other}"
                )))
            }
        };
        for (field, value) in fields {
            let path = format!("{}.{}", section.trim(), field.trim());
            settings.push(Setting::new(&path, value, source, origin)?);
        }
    }
    Ok(settings)
}

fn settings_from_env() -> Result<Vec<Setting>, PolicyError> {
    let mut settings = Vec::new();
    for (key, raw) in env::vars() {
        let Some(stripped) = key.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        // DESKPILOT_POLICY__EXECUTION__MAX_RETRIES -> execution.max_retries
        let path = stripped.replacen("__", ".", 1);
        settings.push(Setting::new(&path, Value::String(raw), PolicySource::Env, &key)?);
    }

    if let Ok(raw_json) = env::var(ENV_JSON) {
        if !raw_json.trim().is_empty() {
            let document: Value = serde_json::from_str(&raw_json)
                .map_err(|err| PolicyError::Invalid(format!("{ENV_JSON}: {err}")))?;
            settings.extend(settings_from_document(document, PolicySource::Env, ENV_JSON)?);
        }
    }
    Ok(settings)
}

/// `path=value` pairs separated by commas. A token without `=` continues the
/// previous value, so `safety.sensitive_types=drag,key` stays one setting.
fn settings_from_cli_env() -> Result<Vec<Setting>, PolicyError> {
    let Ok(raw) = env::var(ENV_CLI_OVERRIDES) else {
        return Ok(Vec::new());
    };
    let mut pairs: Vec<(String, String)> = Vec::new();
    for token in raw.split(',').map(str::trim).filter(|token| !token.is_empty()) {
        if let Some((path, value)) = token.split_once('=') {
            pairs.push((path.trim().to_string(), value.trim().to_string()));
            continue;
        }
        match pairs.last_mut() {
            Some((_, value)) => {
                value.push(',');
                value.push_str(token);
            }
            None => {
                return Err(PolicyError::Invalid(format!(
                    "{ENV_CLI_OVERRIDES}: expected path=value, got `{token}`"
                )))
            }
        }
    }
    pairs
        .into_iter()
        .map(|(path, value)| {
            Setting::new(&path, Value::String(value), PolicySource::Cli, ENV_CLI_OVERRIDES)
        })
        .collect()
}

fn coerce(kind: FieldKind, value: Value) -> Result<Value, String> {
    match kind {
        FieldKind::Flag => match &value {
            Value::Bool(_) => Ok(value.clone()),
            Value::Number(n) if n.as_u64() == Some(0) => Ok(Value::Bool(false)),
            Value::Number(n) if n.as_u64() == Some(1) => Ok(Value::Bool(true)),
            Value::String(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(Value::Bool(true)),
                "false" | "no" | "off" | "0" => Ok(Value::Bool(false)),
                _ => Err(format!("expected a boolean, got `{raw}`")),
            },
            other => Err(format!("expected a boolean, got {other}")),
        },
        FieldKind::Count => match &value {
            Value::Number(n) if n.is_u64() => Ok(value.clone()),
            Value::String(raw) => raw
                .trim()
                .parse::<u64>()
                .map(Value::from)
                .map_err(|_| format!("expected a non-negative integer, got `{raw}`")),
            other => Err(format!("expected a non-negative integer, got {other}")),
        },
        FieldKind::Millis => match &value {
            Value::Number(n) if n.is_u64() => Ok(value.clone()),
            Value::String(raw) => parse_millis(raw).map(Value::from),
            other => Err(format!("expected milliseconds, got {other}")),
        },
        FieldKind::Mode => match &value {
            Value::String(raw) => raw
                .parse::<ExecutionMode>()
                .map(|mode| Value::from(mode.as_str()))
                .map_err(|err| err.to_string()),
            other => Err(format!("expected an execution mode, got {other}")),
        },
        FieldKind::ActionKinds => {
            let tokens: Vec<String> = match value {
                Value::Null => Vec::new(),
                Value::String(raw) => raw.split(',').map(str::to_string).collect(),
                Value::Array(items) => items
                    .into_iter()
                    .map(|item| match item {
                        Value::String(token) => Ok(token),
                        other => Err(format!("expected an action type, got {other}")),
                    })
                    .collect::<Result<_, _>>()?,
                other => return Err(format!("expected a list of action types, got {other}")),
            };
            tokens
                .iter()
                .map(|token| token.trim())
                .filter(|token| !token.is_empty())
                .map(|token| {
                    token
                        .parse::<ActionKind>()
                        .map(|kind| Value::from(kind.as_str()))
                        .map_err(|err| err.to_string())
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
    }
}

/// Bare integers are milliseconds; anything else goes through `humantime`
/// (`250ms`, `2s`, `1m 30s`).
fn parse_millis(raw: &str) -> Result<u64, String> {
    let trimmed = raw.trim();
    if let Ok(ms) = trimmed.parse::<u64>() {
        return Ok(ms);
    }
    let duration = humantime::parse_duration(trimmed)
        .map_err(|err| format!("expected milliseconds or a duration like `2s`, got `{raw}`: {err}"))?;
    u64::try_from(duration.as_millis()).map_err(|_| format!("duration `{raw}` is too long"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_table_covers_every_section_field() {
        let snapshot = default_snapshot();
        let sections = [
            ("execution", serde_json::to_value(&snapshot.execution).unwrap()),
            ("safety", serde_json::to_value(&snapshot.safety).unwrap()),
            ("validation", serde_json::to_value(&snapshot.validation).unwrap()),
            ("gate", serde_json::to_value(&snapshot.gate).unwrap()),
            ("supervisor", serde_json::to_value(&snapshot.supervisor).unwrap()),
        ];
        let mut expected = 0;
        for (section, value) in sections {
            for field in value.as_object().unwrap().keys() {
                let path = format!("{section}.{field}");
                assert!(FIELDS.iter().any(|(known, _)| *known == path), "{path} missing");
                expected += 1;
            }
        }
        assert_eq!(FIELDS.len(), expected);
    }

    #[test]
    fn coerces_loose_strings() {
        assert_eq!(coerce(FieldKind::Flag, Value::from("off")).unwrap(), Value::Bool(false));
        assert_eq!(coerce(FieldKind::Millis, Value::from("2s")).unwrap(), Value::from(2_000u64));
        assert_eq!(coerce(FieldKind::Millis, Value::from("250ms")).unwrap(), Value::from(250u64));
        assert_eq!(coerce(FieldKind::Mode, Value::from("full-auto")).unwrap(), Value::from("FULL_AUTO"));
        assert_eq!(
            coerce(FieldKind::ActionKinds, Value::from("Drag, hotkey")).unwrap(),
            serde_json::json!(["drag", "hotkey"])
        );
        assert!(coerce(FieldKind::Count, Value::from(-3)).is_err());
        assert_eq!(coerce(FieldKind::Millis, Value::from("1m 30s")).unwrap(), Value::from(90_000u64));
        assert!(coerce(FieldKind::Millis, Value::from("soon")).is_err());
    }

    #[test]
    fn file_errors_name_the_field_and_origin() {
        let document = serde_json::json!({"execution": {"mode": "TURBO"}});
        let err = settings_from_document(document, PolicySource::File, "policy.yaml").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("execution.mode"), "{message}");
        assert!(message.contains("policy.yaml"), "{message}");

        let nested = serde_json::json!({"safety": {"sensitive_types": ["drag", "teleport"]}});
        assert!(settings_from_document(nested, PolicySource::File, "policy.yaml").is_err());

        let flat = serde_json::json!({"execution": true});
        assert!(settings_from_document(flat, PolicySource::File, "policy.yaml").is_err());
    }
}
