// ABOUTME: Handles to pending task results and the outputs returned by task dispatch
// ABOUTME: gather() is the single blocking operation exposed by every handle

use serde_json::Value;
use tokio::sync::oneshot;
use uuid::Uuid;

use super::error::ExecutorError;
use crate::tasks::error::{Result, TaskError};

pub(crate) type JobSender = oneshot::Sender<Result<Value>>;

#[derive(Debug)]
enum FutureState {
    Ready(Result<Value>),
    Pending {
        job_id: Uuid,
        receiver: oneshot::Receiver<Result<Value>>,
    },
}

/// An opaque handle to a result that may still be computing.
///
/// `gather` blocks the calling thread, so it must not be called from
/// inside an async runtime.
#[derive(Debug)]
pub struct Future {
    state: FutureState,
}

impl Future {
    pub fn ready(value: Value) -> Self {
        Self {
            state: FutureState::Ready(Ok(value)),
        }
    }

    pub fn failed(error: TaskError) -> Self {
        Self {
            state: FutureState::Ready(Err(error)),
        }
    }

    pub(crate) fn pending(job_id: Uuid) -> (Self, JobSender) {
        let (sender, receiver) = oneshot::channel();
        let future = Self {
            state: FutureState::Pending { job_id, receiver },
        };
        (future, sender)
    }

    pub fn gather(self) -> Result<Value> {
        match self.state {
            FutureState::Ready(result) => result,
            FutureState::Pending { job_id, receiver } => receiver
                .blocking_recv()
                .map_err(|_| TaskError::from(ExecutorError::Disconnected { job_id }))?,
        }
    }
}

/// An ordered collection of futures gathered together.
#[derive(Debug, Default)]
pub struct FutureSequence {
    futures: Vec<Future>,
}

impl FutureSequence {
    pub fn new(futures: Vec<Future>) -> Self {
        Self { futures }
    }

    pub fn len(&self) -> usize {
        self.futures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.futures.is_empty()
    }

    /// Gather in submission order, stopping at the first failure.
    pub fn gather(self) -> Result<Vec<Value>> {
        self.futures.into_iter().map(Future::gather).collect()
    }
}

impl FromIterator<Future> for FutureSequence {
    fn from_iter<I: IntoIterator<Item = Future>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Result of `Task::call`: a value from a sync executor or a future from an async one.
#[derive(Debug)]
pub enum TaskOutput {
    Value(Value),
    Future(Future),
}

impl TaskOutput {
    pub fn is_future(&self) -> bool {
        matches!(self, TaskOutput::Future(_))
    }

    pub fn gather(self) -> Result<Value> {
        match self {
            TaskOutput::Value(value) => Ok(value),
            TaskOutput::Future(future) => future.gather(),
        }
    }
}

/// Result of `Task::map`.
#[derive(Debug)]
pub enum SequenceOutput {
    Values(Vec<Value>),
    Futures(FutureSequence),
}

impl SequenceOutput {
    pub fn is_future(&self) -> bool {
        matches!(self, SequenceOutput::Futures(_))
    }

    pub fn gather(self) -> Result<Vec<Value>> {
        match self {
            SequenceOutput::Values(values) => Ok(values),
            SequenceOutput::Futures(futures) => futures.gather(),
        }
    }
}

/// Result of `Task::mapvalues`: `[key, result]` pairs on the wire, `(key, result)` once gathered.
#[derive(Debug)]
pub struct KeyedOutput {
    inner: SequenceOutput,
}

impl KeyedOutput {
    pub(crate) fn new(inner: SequenceOutput) -> Self {
        Self { inner }
    }

    pub fn is_future(&self) -> bool {
        self.inner.is_future()
    }

    /// Gather without reshaping; each element stays a `[key, result]` array.
    pub fn gather_raw(self) -> Result<Vec<Value>> {
        self.inner.gather()
    }

    pub fn gather(self) -> Result<Vec<(Value, Value)>> {
        self.gather_raw()?.into_iter().map(split_pair).collect()
    }
}

pub(crate) fn split_pair(item: Value) -> Result<(Value, Value)> {
    match item {
        Value::Array(mut pair) if pair.len() == 2 => {
            let result = pair.pop().unwrap_or(Value::Null);
            let key = pair.pop().unwrap_or(Value::Null);
            Ok((key, result))
        }
        other => Err(TaskError::MalformedKeyedResult(format!(
            "expected a [key, result] pair, got {}",
            other
        ))),
    }
}
