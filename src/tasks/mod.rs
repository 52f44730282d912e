// ABOUTME: Task wrapper, call signatures, and the registry interface mapping names to tasks
// ABOUTME: KnownTasks is the in-memory registry used by the spec validator and graph builder

pub mod error;
pub mod operator;
pub mod signature;
pub mod task;

pub use error::TaskError;
pub use operator::{OperatorKws, TaskTag};
pub use signature::{kwargs, Arguments, Callable, Kwargs, ParamKind, Parameter, Signature};
pub use task::{Task, TaskBuilder, TaskChanges, Validator};

use indexmap::IndexMap;

/// What the registry knows about a task: the task itself plus the
/// tags and parameter types needed to describe its inputs.
#[derive(Debug, Clone)]
pub struct TaskDescriptor {
    pub name: String,
    pub task: Task,
    pub tags: Vec<TaskTag>,
    pub signature: Signature,
}

impl TaskDescriptor {
    pub fn new(task: Task) -> Self {
        Self {
            name: task.name().to_string(),
            tags: task.tags().to_vec(),
            signature: task.signature().clone(),
            task,
        }
    }
}

/// Resolves task names found in workflow documents.
pub trait TaskRegistry: Send + Sync {
    fn resolve(&self, name: &str) -> Option<TaskDescriptor>;

    fn exists(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct KnownTasks {
    tasks: IndexMap<String, Task>,
}

impl KnownTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, task: Task) {
        self.tasks.insert(task.name().to_string(), task);
    }

    pub fn with_task(mut self, task: Task) -> Self {
        self.register(task);
        self
    }

    pub fn list_known_tasks(&self) -> Vec<&str> {
        self.tasks.keys().map(|k| k.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl TaskRegistry for KnownTasks {
    fn resolve(&self, name: &str) -> Option<TaskDescriptor> {
        self.tasks.get(name).cloned().map(TaskDescriptor::new)
    }

    fn exists(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }
}
