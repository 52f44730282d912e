// ABOUTME: Dependency graph management, execution planning, and the topological cursor
// ABOUTME: Built from an id -> dependency-ids map produced by a validated workflow spec

use indexmap::IndexMap;
use petgraph::algo::toposort;
use petgraph::graph::NodeIndex;
use petgraph::{Direction, Graph};
use std::collections::HashSet;

use super::error::{ExecutionError, Result};

pub type DependencyMap = IndexMap<String, Vec<String>>;

pub struct DependencyGraph {
    graph: Graph<String, ()>,
    task_indices: IndexMap<String, NodeIndex>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPlan {
    pub batches: Vec<Vec<String>>,
    pub total_tasks: usize,
}

impl DependencyGraph {
    /// Create a dependency graph from an id -> dependencies map
    pub fn from_dependencies(dependencies: &DependencyMap) -> Result<Self> {
        let mut graph = Graph::new();
        let mut task_indices = IndexMap::new();

        for task_id in dependencies.keys() {
            let node_index = graph.add_node(task_id.clone());
            task_indices.insert(task_id.clone(), node_index);
        }

        for (task_id, deps) in dependencies {
            let task_node = task_indices[task_id];
            for dependency in deps {
                match task_indices.get(dependency) {
                    // dependency -> task
                    Some(&dep_node) => {
                        graph.add_edge(dep_node, task_node, ());
                    }
                    None => {
                        return Err(ExecutionError::MissingDependency {
                            node: task_id.clone(),
                            dependency: dependency.clone(),
                        })
                    }
                }
            }
        }

        Ok(Self {
            graph,
            task_indices,
        })
    }

    pub fn is_acyclic(&self) -> bool {
        toposort(&self.graph, None).is_ok()
    }

    fn check_acyclic(&self) -> Result<()> {
        toposort(&self.graph, None)
            .map(|_| ())
            .map_err(|cycle| ExecutionError::CircularDependency {
                tasks: vec![self.graph[cycle.node_id()].clone()],
            })
    }

    /// Create an execution plan; each batch is sorted by id.
    pub fn create_execution_plan(&self) -> Result<ExecutionPlan> {
        self.check_acyclic()?;

        let mut sorter = TopologicalSorter::from_graph(self);
        let mut batches = Vec::new();
        while sorter.is_active() {
            let batch = sorter.get_ready();
            sorter.done(&batch)?;
            batches.push(batch);
        }

        Ok(ExecutionPlan {
            batches,
            total_tasks: self.task_indices.len(),
        })
    }

    pub fn get_dependents(&self, task_id: &str) -> Vec<String> {
        self.neighbors(task_id, Direction::Outgoing)
    }

    pub fn get_dependencies(&self, task_id: &str) -> Vec<String> {
        self.neighbors(task_id, Direction::Incoming)
    }

    fn neighbors(&self, task_id: &str, direction: Direction) -> Vec<String> {
        let Some(&node_idx) = self.task_indices.get(task_id) else {
            return Vec::new();
        };
        let mut ids: Vec<String> = self
            .graph
            .neighbors_directed(node_idx, direction)
            .map(|n| self.graph[n].clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        ids.sort_by_key(|id| self.task_indices.get_index_of(id));
        ids
    }

    /// Tasks with no dependencies, in declaration order
    pub fn get_root_tasks(&self) -> Vec<String> {
        self.filter_tasks(Direction::Incoming)
    }

    /// Tasks nothing depends on, in declaration order
    pub fn get_leaf_tasks(&self) -> Vec<String> {
        self.filter_tasks(Direction::Outgoing)
    }

    fn filter_tasks(&self, direction: Direction) -> Vec<String> {
        self.task_indices
            .iter()
            .filter(|(_, idx)| {
                self.graph
                    .neighbors_directed(**idx, direction)
                    .next()
                    .is_none()
            })
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.task_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.task_indices.is_empty()
    }
}

impl ExecutionPlan {
    /// Get the maximum parallelism level (largest batch size)
    pub fn max_parallelism(&self) -> usize {
        self.batches.iter().map(|batch| batch.len()).max().unwrap_or(0)
    }

    /// Get the total number of execution phases
    pub fn execution_depth(&self) -> usize {
        self.batches.len()
    }

    pub fn contains_task(&self, task_id: &str) -> bool {
        self.get_task_batch_index(task_id).is_some()
    }

    pub fn get_task_batch_index(&self, task_id: &str) -> Option<usize> {
        self.batches
            .iter()
            .position(|batch| batch.iter().any(|id| id == task_id))
    }
}

/// Wave-by-wave cursor over a dependency map.
///
/// `get_ready` hands out every node whose dependencies have all been marked
/// `done`; callers dispatch the wave, mark it done, and repeat while
/// `is_active`.
#[derive(Debug)]
pub struct TopologicalSorter {
    remaining: IndexMap<String, usize>,
    dependents: IndexMap<String, Vec<String>>,
    handed_out: HashSet<String>,
    finished: HashSet<String>,
}

impl TopologicalSorter {
    /// Fails with `CircularDependency` if the map contains a cycle.
    pub fn prepare(dependencies: &DependencyMap) -> Result<Self> {
        let graph = DependencyGraph::from_dependencies(dependencies)?;
        graph.check_acyclic()?;
        Ok(Self::from_graph(&graph))
    }

    fn from_graph(graph: &DependencyGraph) -> Self {
        let mut remaining = IndexMap::new();
        let mut dependents = IndexMap::new();
        for id in graph.task_indices.keys() {
            remaining.insert(id.clone(), graph.get_dependencies(id).len());
            dependents.insert(id.clone(), graph.get_dependents(id));
        }
        Self {
            remaining,
            dependents,
            handed_out: HashSet::new(),
            finished: HashSet::new(),
        }
    }

    /// Nodes ready to dispatch that have not been handed out yet, sorted by id.
    pub fn get_ready(&mut self) -> Vec<String> {
        let mut ready: Vec<String> = self
            .remaining
            .iter()
            .filter(|(id, count)| **count == 0 && !self.handed_out.contains(id.as_str()))
            .map(|(id, _)| id.clone())
            .collect();
        ready.sort();
        self.handed_out.extend(ready.iter().cloned());
        ready
    }

    pub fn done(&mut self, ids: &[String]) -> Result<()> {
        for id in ids {
            if !self.handed_out.contains(id) || self.finished.contains(id) {
                return Err(ExecutionError::NotReady { node: id.clone() });
            }
            self.finished.insert(id.clone());
            for dependent in self.dependents.get(id).into_iter().flatten() {
                if let Some(count) = self.remaining.get_mut(dependent) {
                    *count = count.saturating_sub(1);
                }
            }
        }
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.finished.len() < self.remaining.len()
    }
}
