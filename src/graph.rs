//! Task graph construction and dependency resolution
//!
//! Uses petgraph to hold the dependency relation between the selected tasks.
//! Names are resolved against a lookup built from every task first, so the
//! result never depends on the order tasks were handed in. Edges point from
//! the dependency to the dependent, the direction completion signals travel.

use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::config::Config;
use crate::error::{Result, TaktError};
use crate::task::{TagFilter, TaskDefinition};
use crate::unit::ExecutionUnit;

/// The task dependency graph for one run
#[derive(Debug)]
pub struct TaskGraph {
    graph: DiGraph<TaskDefinition, ()>,
    name_to_index: HashMap<String, NodeIndex>,
    excluded: Vec<String>,
}

impl TaskGraph {
    /// Build a graph over every definition
    pub fn build(tasks: Vec<TaskDefinition>) -> Result<Self> {
        Self::build_selected(tasks, Vec::new())
    }

    /// Build a graph over the tasks a tag filter kept. `excluded` names the
    /// tasks it dropped, so a dependency on one of them is reported as such.
    pub fn build_selected(tasks: Vec<TaskDefinition>, excluded: Vec<String>) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut name_to_index = HashMap::new();

        for task in tasks {
            if name_to_index.contains_key(&task.name) {
                return Err(TaktError::DuplicateTask { name: task.name });
            }
            let name = task.name.clone();
            let idx = graph.add_node(task);
            name_to_index.insert(name, idx);
        }

        let mut edges = Vec::new();
        for idx in graph.node_indices() {
            let task = &graph[idx];
            for dep in &task.depends {
                if dep == &task.name {
                    return Err(TaktError::InvalidTask {
                        task: task.name.clone(),
                        reason: "a task cannot depend on itself".to_string(),
                    });
                }
                let dep_idx = name_to_index.get(dep).ok_or_else(|| {
                    TaktError::unresolved(&task.name, dep, excluded.contains(dep))
                })?;
                edges.push((*dep_idx, idx));
            }
        }

        for (dep_idx, task_idx) in edges {
            // Listing a dependency twice still waits on it once
            graph.update_edge(dep_idx, task_idx, ());
        }

        Ok(Self {
            graph,
            name_to_index,
            excluded,
        })
    }

    /// Build from a loaded task file, keeping what `filter` selects
    pub fn from_config(config: &Config, filter: &TagFilter) -> Result<Self> {
        let (selected, excluded) = config.select(filter);
        Self::build_selected(selected, excluded)
    }

    /// Turn the graph into runnable units, one one-shot channel per edge
    pub fn into_units(self) -> Vec<ExecutionUnit> {
        let (nodes, edges) = self.graph.into_nodes_edges();
        let mut units: Vec<Option<ExecutionUnit>> = nodes
            .into_iter()
            .map(|node| Some(ExecutionUnit::new(node.weight)))
            .collect();

        for edge in edges {
            let (from, to) = (edge.source().index(), edge.target().index());
            let mut dependency = units[from].take();
            let mut dependent = units[to].take();
            if let (Some(dependency), Some(dependent)) = (&mut dependency, &mut dependent) {
                ExecutionUnit::link(dependency, dependent);
            }
            units[from] = dependency;
            units[to] = dependent;
        }

        units.into_iter().flatten().collect()
    }

    /// Names of tasks dropped by the tag filter
    pub fn excluded(&self) -> &[String] {
        &self.excluded
    }

    /// Every `(dependency, dependent)` pair
    pub fn edges(&self) -> BTreeSet<(String, String)> {
        self.graph
            .edge_references()
            .map(|edge| {
                (
                    self.graph[edge.source()].name.clone(),
                    self.graph[edge.target()].name.clone(),
                )
            })
            .collect()
    }

    /// All tasks, dependencies before dependents
    pub fn all_tasks_ordered(&self) -> Result<Vec<&TaskDefinition>> {
        let sorted = toposort(&self.graph, None).map_err(|_| TaktError::CyclicDependency {
            cycle: self.find_cycle().unwrap_or_else(|| "unknown cycle".to_string()),
        })?;

        Ok(sorted.into_iter().map(|idx| &self.graph[idx]).collect())
    }

    /// Fail if the dependency relation contains a cycle. A run never calls
    /// this; cyclic tasks simply wait on each other until canceled.
    pub fn check_acyclic(&self) -> Result<()> {
        if is_cyclic_directed(&self.graph) {
            let cycle = self.find_cycle().unwrap_or_else(|| "unknown cycle".to_string());
            return Err(TaktError::CyclicDependency { cycle });
        }
        Ok(())
    }

    /// Human-readable description of one cycle, if there is any
    fn find_cycle(&self) -> Option<String> {
        let mut names: Vec<_> = self.name_to_index.iter().collect();
        names.sort();

        for (name, &idx) in names {
            let mut visited = HashSet::new();
            let mut path = vec![name.clone()];

            if self.dfs_find_cycle(idx, idx, &mut visited, &mut path) {
                return Some(path.join(" -> "));
            }
        }

        None
    }

    fn dfs_find_cycle(
        &self,
        current: NodeIndex,
        target: NodeIndex,
        visited: &mut HashSet<NodeIndex>,
        path: &mut Vec<String>,
    ) -> bool {
        for neighbor in self.graph.neighbors(current) {
            if neighbor == target {
                path.push(self.graph[target].name.clone());
                return true;
            }

            if visited.insert(neighbor) {
                path.push(self.graph[neighbor].name.clone());
                if self.dfs_find_cycle(neighbor, target, visited, path) {
                    return true;
                }
                path.pop();
            }
        }

        false
    }

    pub fn get_task(&self, name: &str) -> Option<&TaskDefinition> {
        self.name_to_index.get(name).map(|&idx| &self.graph[idx])
    }

    /// All task names, sorted
    pub fn task_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.name_to_index.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Direct dependencies of a task
    pub fn dependencies(&self, name: &str) -> Option<Vec<&str>> {
        self.neighbors(name, Direction::Incoming)
    }

    /// Tasks that depend directly on the given task
    pub fn dependents(&self, name: &str) -> Option<Vec<&str>> {
        self.neighbors(name, Direction::Outgoing)
    }

    fn neighbors(&self, name: &str, direction: Direction) -> Option<Vec<&str>> {
        self.name_to_index.get(name).map(|&idx| {
            let mut names: Vec<_> = self
                .graph
                .neighbors_directed(idx, direction)
                .map(|other| self.graph[other].name.as_str())
                .collect();
            names.sort_unstable();
            names
        })
    }
}
