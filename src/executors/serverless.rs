// ABOUTME: Asynchronous executor that submits keyword-only jobs to a function service
// ABOUTME: Returns futures immediately so independent tasks overlap

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use super::error::ExecutorError;
use super::future::{Future, FutureSequence};
use super::service::{FunctionService, JobPayload, LocalFunctionService};
use super::AsyncExecutor;
use crate::tasks::error::Result;
use crate::tasks::signature::{Arguments, Callable};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeBackend {
    #[default]
    Localhost,
}

impl fmt::Display for ComputeBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComputeBackend::Localhost => write!(f, "localhost"),
        }
    }
}

impl FromStr for ComputeBackend {
    type Err = ExecutorError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "localhost" | "local" => Ok(ComputeBackend::Localhost),
            other => Err(ExecutorError::UnsupportedBackend(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerlessConfig {
    #[serde(default)]
    pub backend: ComputeBackend,
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for ServerlessConfig {
    fn default() -> Self {
        Self {
            backend: ComputeBackend::default(),
            workers: default_workers(),
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[derive(Debug, Clone)]
pub struct ServerlessExecutor {
    service: Arc<dyn FunctionService>,
}

impl ServerlessExecutor {
    pub fn new(service: Arc<dyn FunctionService>) -> Self {
        Self { service }
    }

    pub fn from_config(config: &ServerlessConfig) -> std::result::Result<Self, ExecutorError> {
        match config.backend {
            ComputeBackend::Localhost => Ok(Self::new(Arc::new(LocalFunctionService::new(
                config.workers,
            )))),
        }
    }

    pub fn backend(&self) -> ComputeBackend {
        self.service.backend()
    }

    fn submit(&self, callable: &Callable, arguments: Arguments) -> Result<Future> {
        if !arguments.is_keyword_only() {
            return Err(ExecutorError::PositionalArgsRejected {
                executor: self.name().to_string(),
                count: arguments.args.len(),
            }
            .into());
        }
        let payload = JobPayload::new(callable.name(), arguments.kwargs);
        Ok(self.service.submit(callable, payload)?)
    }
}

impl Default for ServerlessExecutor {
    fn default() -> Self {
        Self::new(Arc::new(LocalFunctionService::new(default_workers())))
    }
}

impl AsyncExecutor for ServerlessExecutor {
    fn name(&self) -> &str {
        "serverless"
    }

    fn call(&self, callable: &Callable, arguments: Arguments) -> Result<Future> {
        self.submit(callable, arguments)
    }

    fn map(&self, callable: &Callable, iterable: Vec<Arguments>) -> Result<FutureSequence> {
        debug!(
            "Submitting {} jobs for {} to {}",
            iterable.len(),
            callable.name(),
            self.backend()
        );
        iterable
            .into_iter()
            .map(|arguments| self.submit(callable, arguments))
            .collect::<Result<Vec<_>>>()
            .map(FutureSequence::new)
    }
}
