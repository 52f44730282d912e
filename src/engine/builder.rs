// ABOUTME: Builds a runnable Graph from a validated WorkflowSpec and a task registry
// ABOUTME: Applies executor selection, validation mode, and user parameters to every node

use indexmap::IndexMap;
use tracing::debug;

use super::error::{ExecutionError, Result};
use super::graph::{ArgBinding, Graph, Node, Operation};
use crate::executors::Executor;
use crate::parser::{TaskInstance, WorkflowParams, WorkflowSpec};
use crate::tasks::TaskRegistry;

pub struct GraphBuilder<'a> {
    spec: &'a WorkflowSpec,
    registry: &'a dyn TaskRegistry,
    params: WorkflowParams,
    executor: Executor,
    validate: bool,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(spec: &'a WorkflowSpec, registry: &'a dyn TaskRegistry) -> Self {
        Self {
            spec,
            registry,
            params: WorkflowParams::default(),
            executor: Executor::default(),
            validate: false,
        }
    }

    pub fn with_params(mut self, params: WorkflowParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_executor(mut self, executor: Executor) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    pub fn build(self) -> Result<Graph> {
        if let Some(unknown) = self.params.task_ids().find(|id| self.spec.get(id).is_none()) {
            return Err(ExecutionError::UnknownParamsTarget {
                node: unknown.to_string(),
            });
        }

        let mut nodes = IndexMap::new();
        for instance in self.spec.instances() {
            nodes.insert(instance.id.clone(), self.build_node(instance)?);
        }

        debug!(
            "Built graph for '{}' with {} nodes on the {} executor",
            self.spec.id(),
            nodes.len(),
            self.executor.name()
        );
        Graph::new(self.spec.task_instance_dependencies(), nodes)
    }

    fn build_node(&self, instance: &TaskInstance) -> Result<Node> {
        let descriptor = self
            .registry
            .resolve(&instance.known_task_name)
            .ok_or_else(|| ExecutionError::UnknownTask {
                node: instance.id.clone(),
                task: instance.known_task_name.clone(),
            })?;

        let mut task = descriptor
            .task
            .set_executor(self.executor.clone())
            .map_err(|e| ExecutionError::task(&instance.id, e))?;
        if self.validate {
            task = task.validated();
        }

        let mut node = Node::new(task);
        for (argument, value) in &instance.partial {
            node = node.with_partial(argument.clone(), ArgBinding::from(value));
        }

        if let Some(user_params) = self.params.get(&instance.id) {
            let omit = instance.omit_args();
            for (argument, value) in user_params {
                if omit.contains(argument) {
                    return Err(ExecutionError::ParamConflict {
                        node: instance.id.clone(),
                        argument: argument.clone(),
                    });
                }
                node = node.with_partial(argument.clone(), ArgBinding::Literal(value.clone()));
            }
        }

        let operation = match (&instance.map, &instance.mapvalues) {
            (Some(op), _) => Operation::Map {
                argnames: op.argnames.clone(),
                argvalues: ArgBinding::from(&op.argvalues),
            },
            (None, Some(op)) => Operation::MapValues {
                argname: op.argnames.first().cloned().unwrap_or_default(),
                argvalues: ArgBinding::from(&op.argvalues),
            },
            (None, None) => Operation::Call,
        };
        Ok(node.with_operation(operation))
    }
}
