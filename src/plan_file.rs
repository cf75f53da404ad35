use std::fs;
use std::path::{Path, PathBuf};

use deskpilot_core_types::{ActionPlan, ElementSnapshot, TaskId, UIElement};
use deskpilot_supervisor::PlanRequest;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlanFileError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Plan document produced by the plan generator.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PlanFile {
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default, alias = "original_command")]
    pub command: Option<String>,
    #[serde(default)]
    pub previous_output: Option<String>,
    pub actions: Vec<ActionPlan>,
    #[serde(default)]
    pub elements: Vec<UIElement>,
}

/// A plan file is either a full document or a bare action list.
#[derive(Deserialize)]
#[serde(untagged)]
enum PlanDocument {
    Full(PlanFile),
    Actions(Vec<ActionPlan>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ElementDocument {
    Wrapped { elements: Vec<UIElement> },
    Bare(Vec<UIElement>),
}

impl PlanFile {
    /// Builds the engine request; `extra` elements are merged after the inline ones.
    pub fn into_request(self, extra: Vec<UIElement>) -> PlanRequest {
        let elements = ElementSnapshot::new(self.elements.into_iter().chain(extra));
        let mut request = PlanRequest::new(self.actions, elements);
        if let Some(task_id) = self.task_id.filter(|id| !id.trim().is_empty()) {
            request = request.with_task_id(TaskId(task_id));
        }
        if let Some(command) = self.command {
            request = request.with_command(command);
        }
        if let Some(previous) = self.previous_output {
            request = request.with_previous_output(previous);
        }
        request
    }
}

pub fn load_plan(path: &Path) -> Result<PlanFile, PlanFileError> {
    let document: PlanDocument = read_document(path)?;
    Ok(match document {
        PlanDocument::Full(plan) => plan,
        PlanDocument::Actions(actions) => PlanFile {
            actions,
            ..PlanFile::default()
        },
    })
}

pub fn load_elements(path: &Path) -> Result<Vec<UIElement>, PlanFileError> {
    let document: ElementDocument = read_document(path)?;
    Ok(match document {
        ElementDocument::Wrapped { elements } | ElementDocument::Bare(elements) => elements,
    })
}

fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T, PlanFileError> {
    let raw = fs::read_to_string(path).map_err(|source| PlanFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let is_yaml = matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml" | "yml")
    );
    let parsed = if is_yaml {
        serde_yaml::from_str(&raw).map_err(|err| err.to_string())
    } else {
        serde_json::from_str(&raw).map_err(|err| err.to_string())
    };
    parsed.map_err(|message| PlanFileError::Parse {
        path: path.to_path_buf(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskpilot_core_types::ActionKind;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(suffix: &str, body: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_full_json_document() {
        let file = write_temp(
            ".json",
            r#"{
                "task_id": "task_demo",
                "command": "open settings",
                "actions": [
                    {"type": "click", "description": "gear icon", "element_id": 3},
                    {"type": "wait", "duration": 0.5}
                ],
                "elements": [{"id": 3, "type": "icon", "coordinates": [10, 10, 30, 30]}]
            }"#,
        );
        let plan = load_plan(file.path()).unwrap();
        assert_eq!(plan.actions.len(), 2);
        assert_eq!(plan.actions[0].kind, ActionKind::Click);
        assert_eq!(plan.actions[0].element_id.as_deref(), Some("3"));

        let request = plan.into_request(Vec::new());
        assert_eq!(request.task_id, TaskId::from("task_demo"));
        assert_eq!(request.original_command.as_deref(), Some("open settings"));
        assert!(request.elements.get("3").is_some());
    }

    #[test]
    fn loads_bare_yaml_action_list() {
        let file = write_temp(
            ".yaml",
            "- type: type\n  description: greeting\n  text: hello\n- type: hotkey\n  keys: [ctrl, s]\n",
        );
        let plan = load_plan(file.path()).unwrap();
        assert_eq!(plan.actions.len(), 2);
        assert!(plan.command.is_none());
        assert_eq!(plan.actions[1].kind, ActionKind::Hotkey);
    }

    #[test]
    fn element_file_accepts_both_shapes() {
        let bare = write_temp(".json", r#"[{"id": 1, "coordinates": [0, 0, 4, 4]}]"#);
        let wrapped = write_temp(".json", r#"{"elements": [{"id": 2}]}"#);
        assert_eq!(load_elements(bare.path()).unwrap()[0].id, 1);
        assert_eq!(load_elements(wrapped.path()).unwrap()[0].id, 2);
    }

    #[test]
    fn reports_parse_errors_with_path() {
        let file = write_temp(".json", "{ not json");
        let err = load_plan(file.path()).unwrap_err();
        assert!(matches!(err, PlanFileError::Parse { .. }));
        assert!(err.to_string().contains("failed to parse"));
    }
}
