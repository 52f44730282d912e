// ABOUTME: Error types for workflow specification parsing and validation
// ABOUTME: ValidationError has one variant per structural rule a specification must satisfy

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParserError {
    #[error("Failed to read workflow file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Workflow validation failed with {} error(s): {}", .errors.len(), join_errors(.errors))]
    ValidationFailed { errors: Vec<ValidationError> },
}

impl ParserError {
    /// The collected validation errors, if this is a validation failure.
    pub fn validation_errors(&self) -> &[ValidationError] {
        match self {
            ParserError::ValidationFailed { errors } => errors,
            _ => &[],
        }
    }
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Empty workflow: no task instances defined")]
    EmptyWorkflow,

    #[error("Invalid {field} '{value}': must be a valid identifier")]
    InvalidIdentifier { field: String, value: String },

    #[error("Invalid {field} '{value}': `{value}` is a reserved word")]
    ReservedWord { field: String, value: String },

    #[error("Invalid {field} '{value}': must be at most {max} characters, got {len}")]
    TooLong {
        field: String,
        value: String,
        max: usize,
        len: usize,
    },

    #[error("Task instance id '{id}' collides with a registered task name")]
    TaskNameCollision { id: String },

    #[error("Task instance id '{id}' is the same as the workflow id")]
    IdMatchesSpecId { id: String },

    #[error("Task instance ids must be unique: '{id}' is used by {names:?}")]
    DuplicateId { id: String, names: Vec<String> },

    #[error("Task instance '{id}' references unknown task '{task}'")]
    UnknownTask { id: String, task: String },

    #[error("Task instance '{id}' sets argument '{argument}' which task '{task}' does not accept")]
    UnknownArgument {
        id: String,
        task: String,
        argument: String,
    },

    #[error("Task instance '{id}' has invalid argument name '{argument}'")]
    InvalidArgname { id: String, argument: String },

    #[error("Task instance '{id}' depends on unknown task instance '{dependency}'")]
    UnknownDependency { id: String, dependency: String },

    #[error("Task instance '{id}' cannot depend on itself")]
    SelfDependency { id: String },

    #[error("Task instance '{id}' depends on '{dependency}', which is declared after it; instances must be listed in topological order")]
    NotTopological { id: String, dependency: String },

    #[error("Task instance '{id}' sets both map and mapvalues; they are mutually exclusive")]
    ConflictingParallelOps { id: String },

    #[error("Task instance '{id}' {operation} must set both argnames and argvalues")]
    IncompleteParallelOp { id: String, operation: String },

    #[error("Task instance '{id}' mapvalues accepts exactly one argname, got {argnames:?}")]
    MapValuesArgnames { id: String, argnames: Vec<String> },

    #[error("Invalid variable in '{location}': {reason}")]
    InvalidVariable { location: String, reason: String },
}

pub type Result<T> = std::result::Result<T, ParserError>;
