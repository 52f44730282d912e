// ABOUTME: Main library module for the taskloom task-graph engine
// ABOUTME: Exports all core modules and provides the public API

pub mod config;
pub mod engine;
pub mod executors;
pub mod parser;
pub mod tasks;

// Re-export commonly used types
pub use config::{init_logging, Config};
pub use engine::{Graph, GraphBuilder, RunResult};
pub use executors::{Executor, Future, FutureSequence};
pub use parser::{SpecParser, WorkflowParams, WorkflowSpec};
pub use tasks::{Arguments, KnownTasks, Kwargs, Signature, Task, TaskRegistry};

// Error handling
pub type Result<T> = anyhow::Result<T>;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
