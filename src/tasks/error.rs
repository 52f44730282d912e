// ABOUTME: Error types for task wrapper invocation and argument validation
// ABOUTME: Covers argument binding, validator rejections, and callable failures

use thiserror::Error;

use crate::executors::ExecutorError;

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("{task}() got an unexpected keyword argument '{argument}'")]
    UnexpectedArgument { task: String, argument: String },

    #[error("{task}() missing required argument '{argument}'")]
    MissingArgument { task: String, argument: String },

    #[error("{task}() got multiple values for argument '{argument}'")]
    DuplicateArgument { task: String, argument: String },

    #[error("{task}() takes {expected} positional arguments but {given} were given")]
    TooManyPositional {
        task: String,
        expected: usize,
        given: usize,
    },

    #[error("Validation failed for argument '{argument}' of {task}(): {message}")]
    ArgumentValidation {
        task: String,
        argument: String,
        message: String,
    },

    #[error("Validation failed for return value of {task}(): {message}")]
    ReturnValidation { task: String, message: String },

    #[error("Expected {expected} values per argvalues entry for argnames {argnames:?}, got {given}")]
    ArgvaluesArity {
        argnames: Vec<String>,
        expected: usize,
        given: usize,
    },

    #[error("mapvalues requires exactly one argname, got {0:?}")]
    MapValuesArgnames(Vec<String>),

    #[error("Malformed mapvalues result: {0}")]
    MalformedKeyedResult(String),

    #[error("Task failed: {0}")]
    Failed(String),

    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),
}

impl TaskError {
    /// Shorthand for task bodies reporting their own failure.
    pub fn failed(message: impl Into<String>) -> Self {
        TaskError::Failed(message.into())
    }

    /// True for rejections raised by prevalidators, postvalidators, or type checks.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            TaskError::ArgumentValidation { .. } | TaskError::ReturnValidation { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, TaskError>;
