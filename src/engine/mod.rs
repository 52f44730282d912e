// ABOUTME: Graph execution engine for taskloom workflows
// ABOUTME: Handles dependency resolution, wave scheduling, and argument hydration between nodes

pub mod builder;
pub mod dependency;
pub mod error;
pub mod graph;
pub mod result;

pub use builder::GraphBuilder;
pub use dependency::{DependencyGraph, DependencyMap, ExecutionPlan, TopologicalSorter};
pub use error::{ExecutionError, Result};
pub use graph::{ArgBinding, Graph, Node, Operation};
pub use result::RunResult;
