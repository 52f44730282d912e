// ABOUTME: Declarative deployment metadata and classification tags carried by tasks
// ABOUTME: Read by code generators and mocking harnesses, never enforced at run time

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Container deployment hints for a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperatorKws {
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub name: String,
    /// Resource requests, e.g. `{"request_cpu": "1", "request_memory": "500Mi"}`.
    #[serde(default)]
    pub container_resources: IndexMap<String, String>,
}

impl OperatorKws {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_resource(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.container_resources.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskTag {
    /// Task reaches outside the process (network, storage); mocked in tests.
    Io,
}

impl fmt::Display for TaskTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskTag::Io => write!(f, "io"),
        }
    }
}
