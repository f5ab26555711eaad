//! Dependency graph with eager cycle detection
//!
//! Nodes are named (logical ids or stack names). Edges point from the
//! dependent to its dependency. An edge that would close a cycle is
//! rejected at insertion, so the graph is always a DAG.

use std::collections::{BTreeSet, HashMap};

use petgraph::algo::{astar, toposort};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::error::{SynthError, SynthResult};

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: StableDiGraph<String, ()>,
    index: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn node(&mut self, name: &str) -> NodeIndex {
        if let Some(ix) = self.index.get(name) {
            return *ix;
        }
        let ix = self.graph.add_node(name.to_string());
        self.index.insert(name.to_string(), ix);
        ix
    }

    pub fn add_node(&mut self, name: &str) {
        self.node(name);
    }

    pub fn contains_edge(&self, from: &str, to: &str) -> bool {
        match (self.index.get(from), self.index.get(to)) {
            (Some(a), Some(b)) => self.graph.contains_edge(*a, *b),
            _ => false,
        }
    }

    /// Add `from -> to`, failing if `to` already reaches `from`.
    pub fn add_edge(&mut self, from: &str, to: &str) -> SynthResult<()> {
        let a = self.node(from);
        let b = self.node(to);
        if let Some(path) = self.path(b, a) {
            let mut names = vec![from.to_string()];
            names.extend(path);
            return Err(SynthError::cycle(names));
        }
        if !self.graph.contains_edge(a, b) {
            self.graph.add_edge(a, b, ());
        }
        Ok(())
    }

    /// Replace all outgoing edges of `from`.
    ///
    /// On failure the previous edges are restored.
    pub fn set_edges(&mut self, from: &str, targets: &BTreeSet<String>) -> SynthResult<()> {
        let a = self.node(from);
        let previous: Vec<String> = self
            .graph
            .edges_directed(a, Direction::Outgoing)
            .map(|e| self.graph[e.target()].clone())
            .collect();
        self.clear_edges(a);

        for target in targets {
            if let Err(err) = self.add_edge(from, target) {
                self.clear_edges(a);
                for p in &previous {
                    let b = self.node(p);
                    self.graph.add_edge(a, b, ());
                }
                return Err(err);
            }
        }
        Ok(())
    }

    fn clear_edges(&mut self, ix: NodeIndex) {
        let edges: Vec<_> = self
            .graph
            .edges_directed(ix, Direction::Outgoing)
            .map(|e| e.id())
            .collect();
        for e in edges {
            self.graph.remove_edge(e);
        }
    }

    /// Names along a path `start ⇝ goal`, both ends included
    fn path(&self, start: NodeIndex, goal: NodeIndex) -> Option<Vec<String>> {
        astar(&self.graph, start, |n| n == goal, |_| 1u32, |_| 0u32).map(|(_, nodes)| {
            nodes
                .into_iter()
                .map(|n| self.graph[n].clone())
                .collect()
        })
    }

    /// Node names with every dependency before its dependents
    pub fn order(&self) -> SynthResult<Vec<String>> {
        let sorted = toposort(&self.graph, None).map_err(|cycle| {
            let name = self.graph[cycle.node_id()].clone();
            SynthError::cycle(vec![name.clone(), name])
        })?;
        Ok(sorted
            .into_iter()
            .rev()
            .map(|n| self.graph[n].clone())
            .collect())
    }
}
