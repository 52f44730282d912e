// ABOUTME: Function-execution services that run submitted jobs away from the caller
// ABOUTME: The localhost service ships JSON job payloads to a pooled tokio runtime

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, warn};
use uuid::Uuid;

use super::error::{ExecutorError, Result};
use super::future::Future;
use super::serverless::ComputeBackend;
use crate::tasks::error::TaskError;
use crate::tasks::signature::{Callable, Kwargs};

/// The wire form of one submitted job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    pub job_id: Uuid,
    pub function: String,
    pub kwargs: Kwargs,
}

impl JobPayload {
    pub fn new(function: impl Into<String>, kwargs: Kwargs) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            function: function.into(),
            kwargs,
        }
    }
}

/// A backend able to run a callable on a payload and hand back a future.
pub trait FunctionService: Send + Sync + fmt::Debug {
    fn backend(&self) -> ComputeBackend;

    fn submit(&self, callable: &Callable, payload: JobPayload) -> Result<Future>;
}

/// Runs jobs on a lazily started multi-threaded runtime in this process.
pub struct LocalFunctionService {
    workers: usize,
    runtime: OnceLock<Runtime>,
}

impl LocalFunctionService {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            runtime: OnceLock::new(),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    fn runtime(&self) -> Result<&Runtime> {
        if let Some(runtime) = self.runtime.get() {
            return Ok(runtime);
        }
        let runtime = Builder::new_multi_thread()
            .worker_threads(self.workers)
            .max_blocking_threads(self.workers)
            .thread_name("taskloom-worker")
            .enable_all()
            .build()?;
        debug!("Started localhost function service with {} workers", self.workers);
        Ok(self.runtime.get_or_init(|| runtime))
    }
}

impl fmt::Debug for LocalFunctionService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalFunctionService")
            .field("workers", &self.workers)
            .field("started", &self.runtime.get().is_some())
            .finish()
    }
}

impl FunctionService for LocalFunctionService {
    fn backend(&self) -> ComputeBackend {
        ComputeBackend::Localhost
    }

    fn submit(&self, callable: &Callable, payload: JobPayload) -> Result<Future> {
        let runtime = self.runtime()?;
        let wire = serde_json::to_vec(&payload)?;
        let job_id = payload.job_id;
        let (future, sender) = Future::pending(job_id);
        let callable = callable.clone();

        runtime.spawn_blocking(move || {
            let result = serde_json::from_slice::<JobPayload>(&wire)
                .map_err(|e| TaskError::from(ExecutorError::from(e)))
                .and_then(|job| callable.invoke_kwargs(job.kwargs));

            match &result {
                Ok(_) => debug!("Job {} ({}) completed", job_id, callable.name()),
                Err(e) => warn!("Job {} ({}) failed: {}", job_id, callable.name(), e),
            }
            // Receiver may be gone if the caller never gathers.
            let _ = sender.send(result);
        });

        debug!("Submitted job {} for {}", job_id, payload.function);
        Ok(future)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::signature::{kwargs, Signature};
    use serde_json::json;

    fn double() -> Callable {
        Callable::new("double", Signature::from_names(&["a"]), |kw| {
            Ok(json!(kw["a"].as_i64().unwrap_or_default() * 2))
        })
    }

    #[test]
    fn test_local_service_runs_job() {
        let service = LocalFunctionService::new(2);
        let future = service
            .submit(&double(), JobPayload::new("double", kwargs([("a", json!(21))])))
            .unwrap();
        assert_eq!(future.gather().unwrap(), json!(42));
    }

    #[test]
    fn test_worker_checks_signature() {
        let service = LocalFunctionService::new(1);
        let future = service
            .submit(&double(), JobPayload::new("double", kwargs([("b", json!(1))])))
            .unwrap();
        assert!(matches!(
            future.gather(),
            Err(TaskError::UnexpectedArgument { .. })
        ));
    }

    #[test]
    fn test_workers_floor_at_one() {
        assert_eq!(LocalFunctionService::new(0).workers(), 1);
    }
}
