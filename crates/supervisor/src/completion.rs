//! Prompt and verdict handling for the post-run completion check.

use deskpilot_action_flow::TaskExecutionResult;
use deskpilot_core_types::TaskId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionStatus {
    Completed,
    Incomplete,
    Failed,
    Unclear,
}

impl CompletionStatus {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "completed" => CompletionStatus::Completed,
            "incomplete" => CompletionStatus::Incomplete,
            "failed" => CompletionStatus::Failed,
            _ => CompletionStatus::Unclear,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompletionVerdict {
    pub task_id: TaskId,
    pub status: CompletionStatus,
    pub confidence: f64,
    pub reason: String,
    pub next_steps: Option<String>,
}

impl CompletionVerdict {
    fn unclear(task_id: TaskId, reason: String) -> Self {
        Self {
            task_id,
            status: CompletionStatus::Unclear,
            confidence: 0.0,
            reason,
            next_steps: Some("check the task result manually".to_string()),
        }
    }
}

const VERDICT_TEMPLATE: &str = r#"{"status": "completed|incomplete|failed|unclear", "confidence": 0.0-1.0, "reasoning": "...", "next_steps": "... or null"}"#;

/// Builds the prompt handed to an external verifier.
pub fn build_prompt(
    original_command: &str,
    previous_output: Option<&str>,
    result: &TaskExecutionResult,
) -> String {
    let mut lines = vec![
        "You are verifying whether a desktop task was completed.".to_string(),
        String::new(),
        "Original user command:".to_string(),
        original_command.to_string(),
    ];
    if let Some(previous) = previous_output.filter(|text| !text.trim().is_empty()) {
        lines.push(String::new());
        lines.push("Previous analysis and plan:".to_string());
        lines.push(previous.to_string());
    }
    lines.push(String::new());
    lines.push(format!(
        "Executed actions ({}/{} succeeded):",
        result.completed_actions, result.total_actions
    ));
    lines.extend(result.action_results.iter().map(|action| {
        format!(
            "- [{}] {} {}: {}",
            action.action_index, action.status, action.action_type, action.description
        )
    }));
    lines.push(String::new());
    lines.push("Compare the command with the current screen and reply with JSON only:".to_string());
    lines.push(VERDICT_TEMPLATE.to_string());

    let mut prompt = lines.join("\n");
    prompt.push('\n');
    prompt
}

/// Parses a verifier reply. Never fails: anything unreadable is `unclear`.
pub fn parse_verdict(task_id: TaskId, reply: &str) -> CompletionVerdict {
    let mut body = reply.trim();
    if let Some(stripped) = body.strip_prefix("```json") {
        body = stripped;
    } else if let Some(stripped) = body.strip_prefix("```") {
        body = stripped;
    }
    if let Some(stripped) = body.strip_suffix("```") {
        body = stripped;
    }

    let value: Value = match serde_json::from_str(body.trim()) {
        Ok(value) => value,
        Err(err) => {
            warn!(%task_id, %err, "completion verdict is not valid JSON");
            return CompletionVerdict::unclear(task_id, format!("unreadable verdict: {err}"));
        }
    };

    let status = value
        .get("status")
        .and_then(Value::as_str)
        .map(CompletionStatus::parse)
        .unwrap_or(CompletionStatus::Unclear);
    let confidence = value
        .get("confidence")
        .and_then(|raw| raw.as_f64().or_else(|| raw.as_str()?.parse().ok()))
        .unwrap_or(0.0)
        .clamp(0.0, 1.0);
    let reason = value
        .get("reasoning")
        .or_else(|| value.get("reason"))
        .and_then(Value::as_str)
        .unwrap_or("no reason given")
        .to_string();
    let next_steps = value
        .get("next_steps")
        .and_then(Value::as_str)
        .map(str::to_string);

    info!(%task_id, ?status, confidence, "completion verdict parsed");
    CompletionVerdict {
        task_id,
        status,
        confidence,
        reason,
        next_steps,
    }
}
