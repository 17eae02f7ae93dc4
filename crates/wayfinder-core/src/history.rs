//! The history graph: every step edge ever created.
//!
//! [`HistoryGraph`] wraps a petgraph `StableGraph` together with a map from
//! step to node index. Edges are never duplicated: linking an existing pair is a no-op.
//! Steps are never removed, except that [`HistoryGraph::replace`] renames a
//! vertex in place.

use std::hash::Hash;

use indexmap::IndexMap;
use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableDiGraph;
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::Direction;

/// Directed graph of steps. May contain cycles at the step level.
#[derive(Debug, Clone)]
pub struct HistoryGraph<V> {
    graph: StableDiGraph<V, ()>,
    index: IndexMap<V, NodeIndex<u32>>,
}

impl<V> Default for HistoryGraph<V> {
    fn default() -> Self {
        HistoryGraph {
            graph: StableDiGraph::default(),
            index: IndexMap::new(),
        }
    }
}

impl<V: Clone + Eq + Hash> HistoryGraph<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `step` as a vertex if it is not already present.
    pub fn add_step(&mut self, step: V) -> NodeIndex<u32> {
        if let Some(&idx) = self.index.get(&step) {
            return idx;
        }
        let idx = self.graph.add_node(step.clone());
        self.index.insert(step, idx);
        idx
    }

    /// Adds the edge `from -> to`, creating either vertex as needed.
    pub fn link(&mut self, from: &V, to: &V) {
        let a = self.add_step(from.clone());
        let b = self.add_step(to.clone());
        if self.graph.find_edge(a, b).is_none() {
            self.graph.add_edge(a, b, ());
        }
    }

    pub fn contains(&self, step: &V) -> bool {
        self.index.contains_key(step)
    }

    pub fn contains_edge(&self, from: &V, to: &V) -> bool {
        match (self.index.get(from), self.index.get(to)) {
            (Some(&a), Some(&b)) => self.graph.find_edge(a, b).is_some(),
            _ => false,
        }
    }

    /// A step is a root when nothing leads into it. Unknown steps are roots.
    pub fn is_root(&self, step: &V) -> bool {
        self.predecessors(step).next().is_none()
    }

    pub fn predecessors(&self, step: &V) -> impl Iterator<Item = &V> + '_ {
        self.neighbors(step, Direction::Incoming)
    }

    pub fn successors(&self, step: &V) -> impl Iterator<Item = &V> + '_ {
        self.neighbors(step, Direction::Outgoing)
    }

    pub fn step_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Every edge as a `(from, to)` pair.
    pub fn edges(&self) -> impl Iterator<Item = (&V, &V)> + '_ {
        self.graph
            .edge_references()
            .map(|e| (&self.graph[e.source()], &self.graph[e.target()]))
    }

    /// Renames `from` to `to`, merging edges into `to` if it already exists.
    pub fn replace(&mut self, from: &V, to: &V) {
        if from == to {
            return;
        }
        let Some(old) = self.index.swap_remove(from) else {
            return;
        };
        if !self.contains(to) {
            self.graph[old] = to.clone();
            self.index.insert(to.clone(), old);
            return;
        }

        let incoming = self.endpoints(old, Direction::Incoming);
        let outgoing = self.endpoints(old, Direction::Outgoing);
        self.graph.remove_node(old);
        for source in incoming {
            let source = if source == *from { to.clone() } else { source };
            self.link(&source, to);
        }
        for target in outgoing {
            let target = if target == *from { to.clone() } else { target };
            self.link(to, &target);
        }
    }

    fn neighbors(&self, step: &V, dir: Direction) -> Box<dyn Iterator<Item = &V> + '_> {
        match self.index.get(step) {
            Some(&idx) => Box::new(
                self.graph
                    .neighbors_directed(idx, dir)
                    .map(move |n| &self.graph[n]),
            ),
            None => Box::new(std::iter::empty()),
        }
    }

    fn endpoints(&self, idx: NodeIndex<u32>, dir: Direction) -> Vec<V> {
        self.graph
            .neighbors_directed(idx, dir)
            .map(|n| self.graph[n].clone())
            .collect()
    }
}
