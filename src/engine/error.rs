// ABOUTME: Error types for graph construction and execution
// ABOUTME: Task failures carry the failing node id and abort the whole run

use thiserror::Error;

use crate::tasks::TaskError;

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Task instance '{node}' failed: {source}")]
    Task {
        node: String,
        #[source]
        source: TaskError,
    },

    #[error("Dependency map names '{node}' but no node was provided for it")]
    UnknownNode { node: String },

    #[error("Node '{node}' is missing from the dependency map")]
    UnmappedNode { node: String },

    #[error("Node '{node}' depends on unknown node '{dependency}'")]
    MissingDependency { node: String, dependency: String },

    #[error("Node '{node}' reads from '{dependency}', which is not one of its declared dependencies")]
    UndeclaredDependency { node: String, dependency: String },

    #[error("Circular dependency detected: {tasks:?}")]
    CircularDependency { tasks: Vec<String> },

    #[error("Node '{node}' was marked done before it was ready")]
    NotReady { node: String },

    #[error("Failed to hydrate arguments for '{node}': {reason}")]
    Hydration { node: String, reason: String },

    #[error("Environment variable '{name}' required by '{node}' is not set")]
    MissingEnvVar { node: String, name: String },

    #[error("Task instance '{node}' references unknown task '{task}'")]
    UnknownTask { node: String, task: String },

    #[error("Parameter '{argument}' for '{node}' is supplied by the workflow and cannot be set")]
    ParamConflict { node: String, argument: String },

    #[error("Parameters given for unknown task instance '{node}'")]
    UnknownParamsTarget { node: String },
}

impl ExecutionError {
    pub(crate) fn task(node: &str, source: TaskError) -> Self {
        ExecutionError::Task {
            node: node.to_string(),
            source,
        }
    }

    pub(crate) fn hydration(node: &str, reason: impl Into<String>) -> Self {
        ExecutionError::Hydration {
            node: node.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ExecutionError>;
