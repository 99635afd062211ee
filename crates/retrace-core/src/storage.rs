//! Workflow files on local disk.
//!
//! The format is chosen by extension: `.json`, or `.yaml` / `.yml`.

use crate::{ValidationError, Workflow, validate_workflow};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON workflow: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid YAML workflow: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("workflow failed validation: {0}")]
    Invalid(#[from] ValidationError),

    #[error("unsupported workflow file extension for {0} (expected .json, .yaml or .yml)")]
    UnsupportedFormat(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowFormat {
    Json,
    Yaml,
}

impl WorkflowFormat {
    pub fn from_path(path: &Path) -> Result<Self, StorageError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("json") => Ok(WorkflowFormat::Json),
            Some("yaml") | Some("yml") => Ok(WorkflowFormat::Yaml),
            _ => Err(StorageError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

/// Decode and validate a workflow. Step order is renumbered from the
/// stored order values during decoding.
pub fn parse_workflow(contents: &str, format: WorkflowFormat) -> Result<Workflow, StorageError> {
    let workflow: Workflow = match format {
        WorkflowFormat::Json => serde_json::from_str(contents)?,
        WorkflowFormat::Yaml => serde_yaml::from_str(contents)?,
    };
    validate_workflow(&workflow)?;
    Ok(workflow)
}

pub fn to_string(workflow: &Workflow, format: WorkflowFormat) -> Result<String, StorageError> {
    Ok(match format {
        WorkflowFormat::Json => serde_json::to_string_pretty(workflow)?,
        WorkflowFormat::Yaml => serde_yaml::to_string(workflow)?,
    })
}

pub fn load_workflow(path: &Path) -> Result<Workflow, StorageError> {
    let format = WorkflowFormat::from_path(path)?;
    let contents = std::fs::read_to_string(path).map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let workflow = parse_workflow(&contents, format)?;
    info!(
        path = %path.display(),
        workflow = %workflow.name,
        steps = workflow.len(),
        "Loaded workflow"
    );
    Ok(workflow)
}

/// Write a workflow, creating parent directories as needed.
pub fn save_workflow(workflow: &Workflow, path: &Path) -> Result<(), StorageError> {
    let format = WorkflowFormat::from_path(path)?;
    let contents = to_string(workflow, format)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| StorageError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(path, contents).map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), steps = workflow.len(), "Saved workflow");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Action, ElementSelector, SelectorChain, SelectorKind, TapData, WaitData, WorkflowStep,
    };

    fn sample() -> Workflow {
        let mut wf = Workflow::new("Login flow");
        wf.tags = vec!["smoke".into()];
        let chain = SelectorChain::new(vec![
            ElementSelector::with_default_confidence(SelectorKind::ResourceId, "com.app:id/login")
                .unwrap(),
            ElementSelector::with_default_confidence(SelectorKind::Text, "Login").unwrap(),
        ])
        .unwrap();
        wf.push_step(WorkflowStep::new(Action::Tap(TapData::default()), Some(chain)).named("Tap login"));
        wf.push_step(WorkflowStep::new(Action::Wait(WaitData::for_ms(500)), None));
        wf
    }

    #[test]
    fn json_and_yaml_files_load_back() {
        let dir = tempfile::tempdir().unwrap();
        for file in ["flows/login.json", "login.yaml", "login.YML"] {
            let path = dir.path().join(file);
            let wf = sample();
            save_workflow(&wf, &path).unwrap();
            let loaded = load_workflow(&path).unwrap();
            assert_eq!(loaded.id, wf.id);
            assert_eq!(loaded.tags, wf.tags);
            assert_eq!(loaded.steps(), wf.steps());
        }
    }

    #[test]
    fn selector_chain_is_stored_nested() {
        let json = to_string(&sample(), WorkflowFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let selector = &value["steps"][0]["selector"];
        assert_eq!(selector["type"], "resource_id");
        assert_eq!(selector["fallback"]["type"], "text");
        assert_eq!(selector["fallback"]["value"], "Login");
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = load_workflow(Path::new("flow.toml")).unwrap_err();
        assert!(matches!(err, StorageError::UnsupportedFormat(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_workflow(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, StorageError::Io { .. }));
    }

    #[test]
    fn duplicate_step_ids_fail_validation() {
        let id = uuid::Uuid::new_v4();
        let json = serde_json::json!({
            "name": "dup",
            "steps": [
                {"id": id, "action": "wait", "wait_data": {"duration_ms": 1}},
                {"id": id, "action": "wait", "wait_data": {"duration_ms": 2}}
            ]
        });
        let err = parse_workflow(&json.to_string(), WorkflowFormat::Json).unwrap_err();
        assert!(matches!(
            err,
            StorageError::Invalid(ValidationError::DuplicateStepId(_))
        ));
    }

    #[test]
    fn undecodable_step_keeps_its_place_and_content() {
        let json = serde_json::json!({
            "name": "mixed",
            "steps": [
                {"action": "wait", "wait_data": {"duration_ms": 1}},
                {"action": "pinch", "name": "Zoom", "scale": 2},
                {"action": "wait", "wait_data": {"duration_ms": 2}}
            ]
        });
        let wf = parse_workflow(&json.to_string(), WorkflowFormat::Json).unwrap();
        assert_eq!(wf.len(), 3);
        assert_eq!(wf.steps()[1].kind(), crate::ActionKind::Invalid);

        let saved = to_string(&wf, WorkflowFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&saved).unwrap();
        assert_eq!(value["steps"][1]["action"], "pinch");
        assert_eq!(value["steps"][1]["scale"], 2);
        assert_eq!(value["steps"][1]["order"], 1);
        let reloaded = parse_workflow(&saved, WorkflowFormat::Json).unwrap();
        assert_eq!(reloaded.steps()[1].id, wf.steps()[1].id);
        assert_eq!(reloaded.steps()[1].name, "Zoom");
        assert_eq!(reloaded.steps()[1].kind(), crate::ActionKind::Invalid);
    }

    #[test]
    fn yaml_with_shuffled_order_is_renumbered() {
        let yaml = r#"
name: scroll
steps:
  - action: scroll
    order: 5
    name: later
  - action: tap
    order: 2
    name: earlier
    tap_data: {x: 10, y: 20}
"#;
        let wf = parse_workflow(yaml, WorkflowFormat::Yaml).unwrap();
        assert_eq!(wf.steps()[0].name, "earlier");
        assert_eq!(wf.steps()[1].order(), 1);
    }
}
