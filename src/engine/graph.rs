// ABOUTME: Runtime nodes and the wave-by-wave graph executor
// ABOUTME: Hydrates arguments from upstream futures, dispatches via call/map/mapvalues, returns sink results

use chrono::Utc;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::time::Instant;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::dependency::{DependencyGraph, DependencyMap, TopologicalSorter};
use super::error::{ExecutionError, Result};
use super::result::RunResult;
use crate::executors::{KeyedOutput, SequenceOutput, TaskOutput};
use crate::parser::{ArgValue, WorkflowVariable};
use crate::tasks::{Arguments, Kwargs, Task, TaskError};

/// How a single argument gets its value at run time.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgBinding {
    Literal(Value),
    /// The gathered result of another node.
    DependsOn(String),
    Env(String),
    Sequence(Vec<ArgBinding>),
}

impl ArgBinding {
    pub fn dependencies(&self) -> Vec<&str> {
        match self {
            ArgBinding::Literal(_) | ArgBinding::Env(_) => Vec::new(),
            ArgBinding::DependsOn(id) => vec![id.as_str()],
            ArgBinding::Sequence(items) => items.iter().flat_map(|b| b.dependencies()).collect(),
        }
    }
}

impl From<&WorkflowVariable> for ArgBinding {
    fn from(variable: &WorkflowVariable) -> Self {
        match variable {
            WorkflowVariable::TaskId(id) => ArgBinding::DependsOn(id.clone()),
            WorkflowVariable::Env(name) => ArgBinding::Env(name.clone()),
        }
    }
}

impl From<&ArgValue> for ArgBinding {
    fn from(value: &ArgValue) -> Self {
        match value {
            ArgValue::Literal(value) => ArgBinding::Literal(value.clone()),
            ArgValue::Variable(variable) => variable.into(),
            ArgValue::Variables(variables) => {
                ArgBinding::Sequence(variables.iter().map(ArgBinding::from).collect())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Call,
    Map {
        argnames: Vec<String>,
        argvalues: ArgBinding,
    },
    MapValues {
        argname: String,
        argvalues: ArgBinding,
    },
}

impl Operation {
    fn argvalues(&self) -> Option<&ArgBinding> {
        match self {
            Operation::Call => None,
            Operation::Map { argvalues, .. } | Operation::MapValues { argvalues, .. } => {
                Some(argvalues)
            }
        }
    }
}

/// A task bound to its static arguments and dispatch operation.
#[derive(Debug, Clone)]
pub struct Node {
    pub task: Task,
    pub partial: IndexMap<String, ArgBinding>,
    pub operation: Operation,
}

impl Node {
    pub fn new(task: Task) -> Self {
        Self {
            task,
            partial: IndexMap::new(),
            operation: Operation::Call,
        }
    }

    pub fn with_partial(mut self, argument: impl Into<String>, binding: ArgBinding) -> Self {
        self.partial.insert(argument.into(), binding);
        self
    }

    pub fn with_operation(mut self, operation: Operation) -> Self {
        self.operation = operation;
        self
    }

    /// Every node id this node reads from.
    pub fn dependencies(&self) -> Vec<&str> {
        let mut deps: Vec<&str> = self.partial.values().flat_map(|b| b.dependencies()).collect();
        if let Some(argvalues) = self.operation.argvalues() {
            deps.extend(argvalues.dependencies());
        }
        deps
    }
}

enum NodeOutput {
    Single(TaskOutput),
    Sequence(SequenceOutput),
    Keyed(KeyedOutput),
}

impl NodeOutput {
    /// Keyed results stay `[key, result]` arrays so downstream mapvalues can consume them.
    fn gather(self) -> std::result::Result<Value, TaskError> {
        match self {
            NodeOutput::Single(output) => output.gather(),
            NodeOutput::Sequence(output) => output.gather().map(Value::Array),
            NodeOutput::Keyed(output) => output.gather_raw().map(Value::Array),
        }
    }
}

/// Dispatched outputs and their memoised gathered values for one run.
#[derive(Default)]
struct RunState {
    pending: HashMap<String, NodeOutput>,
    gathered: HashMap<String, Value>,
}

impl RunState {
    fn value_of(&mut self, id: &str) -> Result<Value> {
        if let Some(value) = self.gathered.get(id) {
            return Ok(value.clone());
        }
        let output = self
            .pending
            .remove(id)
            .ok_or_else(|| ExecutionError::UnknownNode {
                node: id.to_string(),
            })?;
        debug!("Gathering result of '{}'", id);
        let value = output.gather().map_err(|e| ExecutionError::task(id, e))?;
        self.gathered.insert(id.to_string(), value.clone());
        Ok(value)
    }
}

/// A dependency map plus one node per id, consumed by a single run.
pub struct Graph {
    dependencies: DependencyMap,
    nodes: IndexMap<String, Node>,
}

impl Graph {
    /// Checks that nodes and the dependency map agree and that the map is acyclic.
    pub fn new(dependencies: DependencyMap, nodes: IndexMap<String, Node>) -> Result<Self> {
        for id in dependencies.keys() {
            if !nodes.contains_key(id) {
                return Err(ExecutionError::UnknownNode { node: id.clone() });
            }
        }
        for (id, node) in &nodes {
            let declared = dependencies
                .get(id)
                .ok_or_else(|| ExecutionError::UnmappedNode { node: id.clone() })?;
            for dependency in node.dependencies() {
                if !declared.iter().any(|d| d == dependency) {
                    return Err(ExecutionError::UndeclaredDependency {
                        node: id.clone(),
                        dependency: dependency.to_string(),
                    });
                }
            }
        }
        TopologicalSorter::prepare(&dependencies)?;
        Ok(Self {
            dependencies,
            nodes,
        })
    }

    pub fn dependencies(&self) -> &DependencyMap {
        &self.dependencies
    }

    pub fn nodes(&self) -> &IndexMap<String, Node> {
        &self.nodes
    }

    /// Nodes no other node depends on, in declaration order.
    pub fn sinks(&self) -> Result<Vec<String>> {
        Ok(DependencyGraph::from_dependencies(&self.dependencies)?.get_leaf_tasks())
    }

    /// Run every node and return the gathered results of the sink nodes.
    pub fn execute(self) -> Result<RunResult> {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let start_time = Instant::now();
        info!(
            "Starting graph execution with {} nodes (run_id: {})",
            self.nodes.len(),
            run_id
        );

        let mut sorter = TopologicalSorter::prepare(&self.dependencies)?;
        let mut state = RunState::default();
        let mut waves = Vec::new();

        while sorter.is_active() {
            let ready = sorter.get_ready();
            debug!("Dispatching wave {}: {:?}", waves.len() + 1, ready);
            for id in &ready {
                info!("Executing node: '{}'", id);
                let output = self.dispatch(id, &mut state).map_err(|e| {
                    error!("Node '{}' failed: {}", id, e);
                    e
                })?;
                state.pending.insert(id.clone(), output);
            }
            sorter.done(&ready)?;
            waves.push(ready);
        }

        let mut results = IndexMap::new();
        for sink in self.sinks()? {
            let value = state.value_of(&sink)?;
            results.insert(sink, value);
        }

        let duration = start_time.elapsed();
        info!(
            "Graph execution completed in {:?}: {} waves, {} terminal results",
            duration,
            waves.len(),
            results.len()
        );

        Ok(RunResult {
            run_id,
            started_at,
            finished_at: Utc::now(),
            duration,
            waves,
            results,
        })
    }

    fn dispatch(&self, id: &str, state: &mut RunState) -> Result<NodeOutput> {
        let node = self
            .nodes
            .get(id)
            .ok_or_else(|| ExecutionError::UnknownNode { node: id.to_string() })?;

        let mut partial = Kwargs::with_capacity(node.partial.len());
        for (argument, binding) in &node.partial {
            partial.insert(argument.clone(), hydrate(id, binding, state)?);
        }
        let task = node
            .task
            .partial(partial)
            .map_err(|e| ExecutionError::task(id, e))?;

        let output = match &node.operation {
            Operation::Call => task.call(Arguments::new()).map(NodeOutput::Single),
            Operation::Map {
                argnames,
                argvalues,
            } => {
                let tuples = map_tuples(id, argnames.len(), hydrate(id, argvalues, state)?)?;
                task.map(argnames.as_slice(), tuples).map(NodeOutput::Sequence)
            }
            Operation::MapValues { argname, argvalues } => {
                let pairs = keyed_pairs(id, hydrate(id, argvalues, state)?)?;
                task.mapvalues(&[argname], pairs).map(NodeOutput::Keyed)
            }
        };
        output.map_err(|e| ExecutionError::task(id, e))
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("dependencies", &self.dependencies)
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn hydrate(node: &str, binding: &ArgBinding, state: &mut RunState) -> Result<Value> {
    match binding {
        ArgBinding::Literal(value) => Ok(value.clone()),
        ArgBinding::DependsOn(id) => state.value_of(id),
        ArgBinding::Env(name) => {
            std::env::var(name)
                .map(Value::String)
                .map_err(|_| ExecutionError::MissingEnvVar {
                    node: node.to_string(),
                    name: name.clone(),
                })
        }
        ArgBinding::Sequence(items) => items
            .iter()
            .map(|item| hydrate(node, item, state))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
    }
}

/// With one argname each element is one value; otherwise each element is a tuple.
fn map_tuples(node: &str, arity: usize, argvalues: Value) -> Result<Vec<Vec<Value>>> {
    let items = match argvalues {
        Value::Array(items) => items,
        other => {
            return Err(ExecutionError::hydration(
                node,
                format!("map argvalues must be a list, got {}", other),
            ))
        }
    };
    if arity == 1 {
        return Ok(items.into_iter().map(|item| vec![item]).collect());
    }
    items
        .into_iter()
        .map(|item| match item {
            Value::Array(values) if values.len() == arity => Ok(values),
            other => Err(ExecutionError::hydration(
                node,
                format!("expected a list of {} values, got {}", arity, other),
            )),
        })
        .collect()
}

/// Accepts a list of `[key, value]` pairs or an object of key -> value.
fn keyed_pairs(node: &str, argvalues: Value) -> Result<Vec<(Value, Value)>> {
    match argvalues {
        Value::Object(map) => Ok(map
            .into_iter()
            .map(|(key, value)| (Value::String(key), value))
            .collect()),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Array(mut pair) if pair.len() == 2 => {
                    let value = pair.pop().unwrap_or(Value::Null);
                    let key = pair.pop().unwrap_or(Value::Null);
                    Ok((key, value))
                }
                other => Err(ExecutionError::hydration(
                    node,
                    format!("expected a [key, value] pair, got {}", other),
                )),
            })
            .collect(),
        other => Err(ExecutionError::hydration(
            node,
            format!("mapvalues argvalues must be a list of pairs, got {}", other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::Signature;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn int(kw: &Kwargs, name: &str) -> i64 {
        kw.get(name).and_then(Value::as_i64).unwrap_or_default()
    }

    fn add() -> Task {
        Task::from_fn("add", Signature::from_names(&["a", "b"]), |kw| {
            Ok(json!(int(&kw, "a") + int(&kw, "b")))
        })
    }

    fn double() -> Task {
        Task::from_fn("double", Signature::from_names(&["a"]), |kw| {
            Ok(json!(int(&kw, "a") * 2))
        })
    }

    fn deps(pairs: &[(&str, &[&str])]) -> DependencyMap {
        pairs
            .iter()
            .map(|(id, ds)| (id.to_string(), ds.iter().map(|d| d.to_string()).collect()))
            .collect()
    }

    #[test]
    fn test_map_over_literal_tuples() {
        let nodes = IndexMap::from([(
            "sums".to_string(),
            Node::new(add()).with_operation(Operation::Map {
                argnames: vec!["a".to_string(), "b".to_string()],
                argvalues: ArgBinding::Literal(json!([[1, 10], [2, 20]])),
            }),
        )]);
        let result = Graph::new(deps(&[("sums", &[])]), nodes)
            .unwrap()
            .execute()
            .unwrap();
        assert_eq!(result.results["sums"], json!([11, 22]));
    }

    #[test]
    fn test_mapvalues_over_upstream_pairs() {
        let nodes = IndexMap::from([
            (
                "pairs".to_string(),
                Node::new(Task::from_fn("pairs", Signature::default(), |_| {
                    Ok(json!([["x", {"a": 1}], ["y", {"a": 2}]]))
                })),
            ),
            (
                "doubled".to_string(),
                Node::new(double()).with_operation(Operation::MapValues {
                    argname: "a".to_string(),
                    argvalues: ArgBinding::DependsOn("pairs".to_string()),
                }),
            ),
        ]);
        let result = Graph::new(deps(&[("pairs", &[]), ("doubled", &["pairs"])]), nodes)
            .unwrap()
            .execute()
            .unwrap();
        assert_eq!(result.results["doubled"], json!([["x", 2], ["y", 4]]));
        assert_eq!(result.results.len(), 1);
    }

    #[test]
    fn test_sinks_at_different_depths_are_all_returned() {
        let nodes = IndexMap::from([
            (
                "a".to_string(),
                Node::new(double()).with_partial("a", ArgBinding::Literal(json!(1))),
            ),
            (
                "shallow".to_string(),
                Node::new(double()).with_partial("a", ArgBinding::DependsOn("a".to_string())),
            ),
            (
                "mid".to_string(),
                Node::new(double()).with_partial("a", ArgBinding::DependsOn("a".to_string())),
            ),
            (
                "deep".to_string(),
                Node::new(double()).with_partial("a", ArgBinding::DependsOn("mid".to_string())),
            ),
        ]);
        let dependencies = deps(&[
            ("a", &[]),
            ("shallow", &["a"]),
            ("mid", &["a"]),
            ("deep", &["mid"]),
        ]);
        let graph = Graph::new(dependencies, nodes).unwrap();
        assert_eq!(graph.sinks().unwrap(), vec!["shallow", "deep"]);

        let result = graph.execute().unwrap();
        assert_eq!(result.results["shallow"], json!(4));
        assert_eq!(result.results["deep"], json!(8));
        assert_eq!(result.waves.len(), 3);
    }

    #[test]
    fn test_upstream_gathered_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let source = Task::from_fn("source", Signature::default(), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(json!(5))
        });
        let nodes = IndexMap::from([
            ("src".to_string(), Node::new(source)),
            (
                "left".to_string(),
                Node::new(double()).with_partial("a", ArgBinding::DependsOn("src".to_string())),
            ),
            (
                "right".to_string(),
                Node::new(add())
                    .with_partial("a", ArgBinding::DependsOn("src".to_string()))
                    .with_partial("b", ArgBinding::DependsOn("src".to_string())),
            ),
        ]);
        let result = Graph::new(
            deps(&[("src", &[]), ("left", &["src"]), ("right", &["src"])]),
            nodes,
        )
        .unwrap()
        .execute()
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.results["left"], json!(10));
        assert_eq!(result.results["right"], json!(10));
    }

    #[test]
    fn test_failure_aborts_with_node_id() {
        let failing = Task::from_fn("explode", Signature::default(), |_| {
            Err(TaskError::failed("boom"))
        });
        let nodes = IndexMap::from([
            ("bad".to_string(), Node::new(failing)),
            (
                "after".to_string(),
                Node::new(double()).with_partial("a", ArgBinding::DependsOn("bad".to_string())),
            ),
        ]);
        let err = Graph::new(deps(&[("bad", &[]), ("after", &["bad"])]), nodes)
            .unwrap()
            .execute()
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Task { ref node, .. } if node == "bad"));
    }

    #[test]
    fn test_construction_checks() {
        let undeclared = IndexMap::from([(
            "x".to_string(),
            Node::new(double()).with_partial("a", ArgBinding::DependsOn("y".to_string())),
        )]);
        assert!(matches!(
            Graph::new(deps(&[("x", &[])]), undeclared),
            Err(ExecutionError::UndeclaredDependency { .. })
        ));

        let missing_node = IndexMap::from([("x".to_string(), Node::new(double()))]);
        assert!(matches!(
            Graph::new(deps(&[("x", &[]), ("y", &[])]), missing_node),
            Err(ExecutionError::UnknownNode { .. })
        ));

        let cyclic = IndexMap::from([
            ("x".to_string(), Node::new(double())),
            ("y".to_string(), Node::new(double())),
        ]);
        assert!(matches!(
            Graph::new(deps(&[("x", &["y"]), ("y", &["x"])]), cyclic),
            Err(ExecutionError::CircularDependency { .. })
        ));
    }

    #[test]
    fn test_map_tuple_shapes() {
        assert_eq!(
            map_tuples("n", 1, json!([1, 2])).unwrap(),
            vec![vec![json!(1)], vec![json!(2)]]
        );
        assert!(map_tuples("n", 2, json!([[1]])).is_err());
        assert!(map_tuples("n", 1, json!(3)).is_err());
        assert_eq!(
            keyed_pairs("n", json!({"k": 1})).unwrap(),
            vec![(json!("k"), json!(1))]
        );
    }
}
