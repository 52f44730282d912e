// ABOUTME: User-supplied parameters for a workflow run, keyed by task instance id
// ABOUTME: Loaded from YAML or JSON documents of the form {task_id: {arg: value}}

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::error::{ParserError, Result};
use crate::tasks::Kwargs;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowParams {
    params: IndexMap<String, Kwargs>,
}

impl WorkflowParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::new());
        }
        serde_yaml::from_str(content).map_err(ParserError::YamlError)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(ParserError::JsonError)
    }

    /// Parse by extension: `.json` as JSON, anything else as YAML.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(ParserError::IoError)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&content),
            _ => Self::from_yaml(&content),
        }
    }

    pub fn with_param(
        mut self,
        task_id: impl Into<String>,
        argument: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        self.params
            .entry(task_id.into())
            .or_default()
            .insert(argument.into(), value);
        self
    }

    pub fn get(&self, task_id: &str) -> Option<&Kwargs> {
        self.params.get(task_id)
    }

    pub fn task_ids(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(|k| k.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_from_yaml_and_json_agree() {
        let yaml = WorkflowParams::from_yaml("events:\n  since: 2024-01-01\n  limit: 10\n").unwrap();
        let json = WorkflowParams::from_json(r#"{"events": {"since": "2024-01-01", "limit": 10}}"#)
            .unwrap();
        assert_eq!(yaml, json);
        assert_eq!(yaml.get("events").unwrap()["limit"], json!(10));
    }

    #[test]
    fn test_empty_yaml_is_no_params() {
        assert!(WorkflowParams::from_yaml("  \n").unwrap().is_empty());
    }

    #[test]
    fn test_from_file_by_extension() {
        let mut file = Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(br#"{"a": {"x": 1}}"#).unwrap();
        let params = WorkflowParams::from_file(file.path()).unwrap();
        assert_eq!(params, WorkflowParams::new().with_param("a", "x", json!(1)));
    }
}
