// ABOUTME: Executor capability traits and the backend selection enum
// ABOUTME: Decouples where a task runs from what the task does

pub mod error;
pub mod future;
pub mod in_process;
pub mod serverless;
pub mod service;

pub use error::ExecutorError;
pub use future::{Future, FutureSequence, KeyedOutput, SequenceOutput, TaskOutput};
pub use in_process::InProcessExecutor;
pub use serverless::{ComputeBackend, ServerlessConfig, ServerlessExecutor};
pub use service::{FunctionService, JobPayload, LocalFunctionService};

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::tasks::error::Result;
use crate::tasks::signature::{Arguments, Callable, Kwargs, ParamKind, Parameter, Signature};

pub const KNOWN_EXECUTORS: &[&str] = &["in_process", "serverless"];

/// Runs work on the caller's thread and returns plain values.
pub trait SyncExecutor: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn call(&self, callable: &Callable, arguments: Arguments) -> Result<Value>;

    fn map(&self, callable: &Callable, iterable: Vec<Arguments>) -> Result<Vec<Value>>;
}

/// Submits work and returns handles immediately.
pub trait AsyncExecutor: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn call(&self, callable: &Callable, arguments: Arguments) -> Result<Future>;

    fn map(&self, callable: &Callable, iterable: Vec<Arguments>) -> Result<FutureSequence>;
}

#[derive(Debug, Clone)]
pub enum Executor {
    Sync(Arc<dyn SyncExecutor>),
    Async(Arc<dyn AsyncExecutor>),
}

impl Executor {
    pub fn in_process() -> Self {
        Executor::Sync(Arc::new(InProcessExecutor))
    }

    pub fn serverless(config: &ServerlessConfig) -> std::result::Result<Self, ExecutorError> {
        Ok(Executor::Async(Arc::new(ServerlessExecutor::from_config(
            config,
        )?)))
    }

    /// Resolve a registered executor name, using default settings for each backend.
    pub fn from_name(name: &str) -> std::result::Result<Self, ExecutorError> {
        match name {
            "in_process" => Ok(Self::in_process()),
            "serverless" => Self::serverless(&ServerlessConfig::default()),
            other => Err(ExecutorError::UnknownExecutor {
                name: other.to_string(),
                known: KNOWN_EXECUTORS.iter().map(|s| s.to_string()).collect(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Executor::Sync(executor) => executor.name(),
            Executor::Async(executor) => executor.name(),
        }
    }

    pub fn is_async(&self) -> bool {
        matches!(self, Executor::Async(_))
    }

    pub fn call(&self, callable: &Callable, arguments: Arguments) -> Result<TaskOutput> {
        match self {
            Executor::Sync(executor) => executor.call(callable, arguments).map(TaskOutput::Value),
            Executor::Async(executor) => executor.call(callable, arguments).map(TaskOutput::Future),
        }
    }

    pub fn map(&self, callable: &Callable, iterable: Vec<Arguments>) -> Result<SequenceOutput> {
        match self {
            Executor::Sync(executor) => executor.map(callable, iterable).map(SequenceOutput::Values),
            Executor::Async(executor) => executor
                .map(callable, iterable)
                .map(SequenceOutput::Futures),
        }
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::in_process()
    }
}

impl From<InProcessExecutor> for Executor {
    fn from(executor: InProcessExecutor) -> Self {
        Executor::Sync(Arc::new(executor))
    }
}

impl From<ServerlessExecutor> for Executor {
    fn from(executor: ServerlessExecutor) -> Self {
        Executor::Async(Arc::new(executor))
    }
}

/// Either an executor name to resolve or a ready executor instance.
#[derive(Debug, Clone)]
pub enum ExecutorChoice {
    Named(String),
    Instance(Executor),
}

impl ExecutorChoice {
    pub fn resolve(self) -> std::result::Result<Executor, ExecutorError> {
        match self {
            ExecutorChoice::Named(name) => Executor::from_name(&name),
            ExecutorChoice::Instance(executor) => Ok(executor),
        }
    }
}

impl From<&str> for ExecutorChoice {
    fn from(name: &str) -> Self {
        ExecutorChoice::Named(name.to_string())
    }
}

impl From<String> for ExecutorChoice {
    fn from(name: String) -> Self {
        ExecutorChoice::Named(name)
    }
}

impl From<Executor> for ExecutorChoice {
    fn from(executor: Executor) -> Self {
        ExecutorChoice::Instance(executor)
    }
}

impl From<InProcessExecutor> for ExecutorChoice {
    fn from(executor: InProcessExecutor) -> Self {
        ExecutorChoice::Instance(executor.into())
    }
}

impl From<ServerlessExecutor> for ExecutorChoice {
    fn from(executor: ServerlessExecutor) -> Self {
        ExecutorChoice::Instance(executor.into())
    }
}

/// Wrap `callable` so it accepts `{key, kwargs}` and returns `[key, result]`.
///
/// The key passes through untouched. `kwargs` is bound against the wrapped
/// callable's own signature, so partially bound defaults still apply.
pub fn mapvalues_wrapper(callable: &Callable) -> Callable {
    let task = callable.name().to_string();
    let inner_signature = callable.signature().clone();
    let signature = Signature::new(vec![
        Parameter::new("key", ParamKind::Any),
        Parameter::new("kwargs", ParamKind::Object),
    ]);

    callable.wrap(callable.name(), signature, move |inner, mut wire| {
        let key = wire.shift_remove("key").unwrap_or(Value::Null);
        let kwargs: Kwargs = match wire.shift_remove("kwargs") {
            Some(Value::Object(map)) => map.into_iter().collect(),
            _ => Kwargs::new(),
        };
        let bound = inner_signature.bind(&task, Arguments::from_kwargs(kwargs))?;
        let result = inner(bound)?;
        Ok(Value::Array(vec![key, result]))
    })
}
