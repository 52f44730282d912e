// ABOUTME: Synchronous executor that runs tasks directly on the calling thread
// ABOUTME: Used by default and whenever a workflow should execute strictly sequentially

use serde_json::Value;

use super::SyncExecutor;
use crate::tasks::error::Result;
use crate::tasks::signature::{Arguments, Callable};

#[derive(Debug, Clone, Copy, Default)]
pub struct InProcessExecutor;

impl SyncExecutor for InProcessExecutor {
    fn name(&self) -> &str {
        "in_process"
    }

    fn call(&self, callable: &Callable, arguments: Arguments) -> Result<Value> {
        callable.invoke(arguments)
    }

    fn map(&self, callable: &Callable, iterable: Vec<Arguments>) -> Result<Vec<Value>> {
        iterable
            .into_iter()
            .map(|arguments| callable.invoke(arguments))
            .collect()
    }
}
