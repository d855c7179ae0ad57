//! File-level dependency graph
//!
//! Built lazily while the engine discovers imports, so every operation goes
//! through one mutex owned by the graph. Edges point from the importing file
//! to the imported file. Cycles are legal and only reported.

use std::{
    fmt::Write as _,
    path::{Path, PathBuf},
};

use log::debug;
use parking_lot::Mutex;
use petgraph::{
    Direction,
    graph::{DiGraph, NodeIndex},
};
use rustc_hash::{FxHashMap, FxHashSet};

#[derive(Debug, Default)]
struct GraphInner {
    graph: DiGraph<PathBuf, ()>,
    node_indices: FxHashMap<PathBuf, NodeIndex>,
}

impl GraphInner {
    fn node(&mut self, path: &Path) -> NodeIndex {
        if let Some(&index) = self.node_indices.get(path) {
            return index;
        }
        let index = self.graph.add_node(path.to_path_buf());
        self.node_indices.insert(path.to_path_buf(), index);
        index
    }

    /// Successors in insertion order
    fn dependencies(&self, node: NodeIndex) -> Vec<NodeIndex> {
        // petgraph yields the most recently added edge first
        let mut neighbors: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(node, Direction::Outgoing)
            .collect();
        neighbors.reverse();
        neighbors
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    /// On the current DFS path
    Gray,
    /// Fully explored
    Black,
}

#[derive(Debug, Default)]
struct CycleSearchState {
    visited: FxHashMap<NodeIndex, Color>,
    path: Vec<NodeIndex>,
    cycles: Vec<Vec<NodeIndex>>,
}

#[derive(Debug, Default)]
pub struct DependencyGraph {
    inner: Mutex<GraphInner>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file
    pub fn add_file(&self, path: &Path) {
        self.inner.lock().node(path);
    }

    /// Record that `from` depends on `to`; returns whether the edge is new
    pub fn add_dependency(&self, from: &Path, to: &Path) -> bool {
        if from == to {
            return false;
        }
        let mut inner = self.inner.lock();
        let from_index = inner.node(from);
        let to_index = inner.node(to);
        if inner.graph.contains_edge(from_index, to_index) {
            return false;
        }
        inner.graph.add_edge(from_index, to_index, ());
        true
    }

    pub fn node_count(&self) -> usize {
        self.inner.lock().graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.lock().graph.edge_count()
    }

    /// Cycles reachable from `entry`, each starting at the file the back-edge
    /// returns to
    pub fn find_cycles(&self, entry: &Path) -> Vec<Vec<PathBuf>> {
        let inner = self.inner.lock();
        let Some(&start) = inner.node_indices.get(entry) else {
            return Vec::new();
        };

        let mut state = CycleSearchState::default();
        Self::dfs_find_cycles(&inner, start, &mut state);
        debug!("Found {} dependency cycles", state.cycles.len());

        state
            .cycles
            .into_iter()
            .map(|cycle| cycle.into_iter().map(|node| inner.graph[node].clone()).collect())
            .collect()
    }

    fn dfs_find_cycles(inner: &GraphInner, node: NodeIndex, state: &mut CycleSearchState) {
        state.visited.insert(node, Color::Gray);
        state.path.push(node);

        for neighbor in inner.dependencies(node) {
            match state.visited.get(&neighbor) {
                None => Self::dfs_find_cycles(inner, neighbor, state),
                Some(Color::Gray) => {
                    if let Some(start_pos) = state.path.iter().position(|&n| n == neighbor) {
                        state.cycles.push(state.path[start_pos..].to_vec());
                    }
                }
                Some(Color::Black) => {}
            }
        }

        state.path.pop();
        state.visited.insert(node, Color::Black);
    }

    /// ASCII rendering of the graph reachable from `root_file`, with paths
    /// shown relative to `project_root`
    pub fn render_tree(&self, root_file: &Path, project_root: &Path) -> String {
        let inner = self.inner.lock();
        let mut output = String::new();
        let Some(&start) = inner.node_indices.get(root_file) else {
            return output;
        };

        let display = |node: NodeIndex| {
            let path = &inner.graph[node];
            path.strip_prefix(project_root)
                .unwrap_or(path)
                .display()
                .to_string()
        };

        let _ = writeln!(output, "{}", display(start));
        let mut expanded = FxHashSet::default();
        expanded.insert(start);
        let mut ancestors = vec![start];
        Self::render_children(&inner, start, "", &mut ancestors, &mut expanded, &display, &mut output);
        output
    }

    fn render_children(
        inner: &GraphInner,
        node: NodeIndex,
        prefix: &str,
        ancestors: &mut Vec<NodeIndex>,
        expanded: &mut FxHashSet<NodeIndex>,
        display: &dyn Fn(NodeIndex) -> String,
        output: &mut String,
    ) {
        let children = inner.dependencies(node);
        let count = children.len();
        for (position, child) in children.into_iter().enumerate() {
            let last = position + 1 == count;
            let branch = if last { "└── " } else { "├── " };
            let note = if ancestors.contains(&child) {
                " (cycle)"
            } else if expanded.contains(&child) {
                " (see above)"
            } else {
                ""
            };
            let _ = writeln!(output, "{prefix}{branch}{}{note}", display(child));

            if note.is_empty() {
                expanded.insert(child);
                ancestors.push(child);
                let child_prefix = format!("{prefix}{}", if last { "    " } else { "│   " });
                Self::render_children(inner, child, &child_prefix, ancestors, expanded, display, output);
                ancestors.pop();
            }
        }
    }
}
