// ABOUTME: Error types raised by executor backends themselves
// ABOUTME: Separates backend plumbing failures from failures of the task being run

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("{executor} accepts keyword arguments only; got {count} positional arguments")]
    PositionalArgsRejected { executor: String, count: usize },

    #[error("Unknown executor '{name}'. Known executors: {known:?}")]
    UnknownExecutor { name: String, known: Vec<String> },

    #[error("Unsupported compute backend: {0}")]
    UnsupportedBackend(String),

    #[error("Failed to start executor runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("Failed to encode job payload: {0}")]
    Wire(#[from] serde_json::Error),

    #[error("Job {job_id} was dropped before producing a result")]
    Disconnected { job_id: Uuid },
}

pub type Result<T> = std::result::Result<T, ExecutorError>;
