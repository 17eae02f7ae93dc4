//! The reference graph: live, reference-counted edges over steps and names.
//!
//! Every edge carries the number of paths currently relying on it. Linking an
//! existing edge adds to its count; unlinking subtracts, and the edge is only
//! dropped once its count reaches zero. Vertices left without any edge are
//! dropped with it.
//!
//! All edges point in the direction values flow:
//! - chain edges `pred -> succ` for adjacent steps of a live path,
//! - definition edges `last step of a bound path -> name`,
//! - dependency edges `name -> step reading it`.
//!
//! A cycle therefore means some step would (transitively) read its own value,
//! and [`ReferenceGraph::link`] refuses any edge that would close one.

use std::fmt;
use std::hash::Hash;

use indexmap::IndexMap;
use petgraph::algo::{has_path_connecting, is_cyclic_directed};
use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableDiGraph;
use petgraph::visit::{DfsPostOrder, EdgeRef, IntoEdgeReferences, Reversed};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::CycleError;
use crate::path::Path;

/// A reference graph vertex: either a step or a lexical name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Vertex<V> {
    Step(V),
    Name(String),
}

impl<V> Vertex<V> {
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Vertex::Name(name) => Some(name),
            Vertex::Step(_) => None,
        }
    }
}

/// Acyclic directed graph whose edge weights are reference counts.
#[derive(Debug, Clone)]
pub struct ReferenceGraph<V> {
    graph: StableDiGraph<Vertex<V>, u32>,
    index: IndexMap<Vertex<V>, NodeIndex<u32>>,
}

impl<V> Default for ReferenceGraph<V> {
    fn default() -> Self {
        ReferenceGraph {
            graph: StableDiGraph::default(),
            index: IndexMap::new(),
        }
    }
}

impl<V: Clone + Eq + Hash + fmt::Debug> ReferenceGraph<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes one more reference on `from -> to`.
    pub fn link(&mut self, from: Vertex<V>, to: Vertex<V>) -> Result<(), CycleError> {
        self.link_counted(from, to, 1)
    }

    /// Takes `count` references on `from -> to`, creating the edge if needed.
    ///
    /// Fails without touching the graph if a new edge would close a cycle.
    pub fn link_counted(
        &mut self,
        from: Vertex<V>,
        to: Vertex<V>,
        count: u32,
    ) -> Result<(), CycleError> {
        if count == 0 {
            return Ok(());
        }
        if let Some(weight) = self.edge_weight_mut(&from, &to) {
            *weight += count;
            trace!(?from, ?to, count = *weight, "reference added");
            return Ok(());
        }
        if self.closes_cycle(&from, &to) {
            return Err(CycleError {
                from: format!("{from:?}"),
                to: format!("{to:?}"),
            });
        }
        let a = self.add_vertex(from);
        let b = self.add_vertex(to);
        self.graph.add_edge(a, b, count);
        trace!(from = ?self.graph[a], to = ?self.graph[b], count, "reference edge created");
        Ok(())
    }

    /// Drops one reference on `from -> to`. Unknown edges are ignored.
    pub fn unlink(&mut self, from: &Vertex<V>, to: &Vertex<V>) {
        let Some((a, b)) = self.endpoints(from, to) else {
            return;
        };
        let Some(edge) = self.graph.find_edge(a, b) else {
            return;
        };
        if self.graph[edge] > 1 {
            self.graph[edge] -= 1;
            trace!(?from, ?to, count = self.graph[edge], "reference dropped");
        } else {
            self.graph.remove_edge(edge);
            trace!(?from, ?to, "reference edge removed");
            self.prune(a);
            self.prune(b);
        }
    }

    /// Removes the edge `from -> to` outright, returning its count.
    pub fn unlink_all(&mut self, from: &Vertex<V>, to: &Vertex<V>) -> Option<u32> {
        let (a, b) = self.endpoints(from, to)?;
        let edge = self.graph.find_edge(a, b)?;
        let count = self.graph.remove_edge(edge);
        self.prune(a);
        self.prune(b);
        count
    }

    /// Takes a reference on every chain edge of `path`.
    pub fn link_path(&mut self, path: &Path<V>) -> Result<(), CycleError> {
        for (pred, succ) in path.edges() {
            self.link(Vertex::Step(pred.clone()), Vertex::Step(succ.clone()))?;
        }
        Ok(())
    }

    /// Drops a reference on every chain edge of `path`.
    pub fn unlink_path(&mut self, path: &Path<V>) {
        for (pred, succ) in path.edges() {
            self.unlink(&Vertex::Step(pred.clone()), &Vertex::Step(succ.clone()));
        }
    }

    /// Current reference count of `from -> to`, if the edge is live.
    pub fn count(&self, from: &Vertex<V>, to: &Vertex<V>) -> Option<u32> {
        let (a, b) = self.endpoints(from, to)?;
        self.graph.find_edge(a, b).map(|edge| self.graph[edge])
    }

    pub fn contains(&self, vertex: &Vertex<V>) -> bool {
        self.index.contains_key(vertex)
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_acyclic(&self) -> bool {
        !is_cyclic_directed(&self.graph)
    }

    /// Every live edge with its reference count.
    pub fn edges(&self) -> impl Iterator<Item = (&Vertex<V>, &Vertex<V>, u32)> + '_ {
        self.graph
            .edge_references()
            .map(|e| (&self.graph[e.source()], &self.graph[e.target()], *e.weight()))
    }

    /// Every vertex `vertex` transitively reads from, itself included, in
    /// topological order: each vertex comes after all of its predecessors.
    pub fn upstream(&self, vertex: &Vertex<V>) -> Vec<&Vertex<V>> {
        let Some(&start) = self.index.get(vertex) else {
            return Vec::new();
        };
        let reversed = Reversed(&self.graph);
        let mut dfs = DfsPostOrder::new(reversed, start);
        let mut order = Vec::new();
        while let Some(idx) = dfs.next(reversed) {
            order.push(&self.graph[idx]);
        }
        order
    }

    /// Substitutes step `to` for step `from`, carrying every edge and count.
    ///
    /// Merging into an existing `to` re-checks each carried edge for cycles.
    pub fn replace(&mut self, from: &V, to: &V) -> Result<(), CycleError> {
        let old = Vertex::Step(from.clone());
        let new = Vertex::Step(to.clone());
        if old == new {
            return Ok(());
        }
        let Some(idx) = self.index.swap_remove(&old) else {
            return Ok(());
        };
        if !self.index.contains_key(&new) {
            self.graph[idx] = new.clone();
            self.index.insert(new, idx);
            return Ok(());
        }

        let incoming = self.weighted_neighbors(idx, Direction::Incoming);
        let outgoing = self.weighted_neighbors(idx, Direction::Outgoing);
        self.graph.remove_node(idx);
        for (source, count) in incoming {
            self.link_counted(source, new.clone(), count)?;
        }
        for (target, count) in outgoing {
            self.link_counted(new.clone(), target, count)?;
        }
        Ok(())
    }

    fn closes_cycle(&self, from: &Vertex<V>, to: &Vertex<V>) -> bool {
        if from == to {
            return true;
        }
        match (self.index.get(from), self.index.get(to)) {
            (Some(&a), Some(&b)) => has_path_connecting(&self.graph, b, a, None),
            _ => false,
        }
    }

    fn add_vertex(&mut self, vertex: Vertex<V>) -> NodeIndex<u32> {
        if let Some(&idx) = self.index.get(&vertex) {
            return idx;
        }
        let idx = self.graph.add_node(vertex.clone());
        self.index.insert(vertex, idx);
        idx
    }

    fn endpoints(&self, from: &Vertex<V>, to: &Vertex<V>) -> Option<(NodeIndex<u32>, NodeIndex<u32>)> {
        Some((*self.index.get(from)?, *self.index.get(to)?))
    }

    fn edge_weight_mut(&mut self, from: &Vertex<V>, to: &Vertex<V>) -> Option<&mut u32> {
        let (a, b) = self.endpoints(from, to)?;
        let edge = self.graph.find_edge(a, b)?;
        self.graph.edge_weight_mut(edge)
    }

    fn weighted_neighbors(&self, idx: NodeIndex<u32>, dir: Direction) -> Vec<(Vertex<V>, u32)> {
        self.graph
            .neighbors_directed(idx, dir)
            .filter_map(|other| {
                let edge = match dir {
                    Direction::Incoming => self.graph.find_edge(other, idx),
                    Direction::Outgoing => self.graph.find_edge(idx, other),
                }?;
                Some((self.graph[other].clone(), self.graph[edge]))
            })
            .collect()
    }

    /// Drops `idx` once no edge touches it.
    fn prune(&mut self, idx: NodeIndex<u32>) {
        let isolated = self
            .graph
            .neighbors_undirected(idx)
            .next()
            .is_none();
        if isolated {
            if let Some(vertex) = self.graph.remove_node(idx) {
                self.index.swap_remove(&vertex);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(s: &'static str) -> Vertex<&'static str> {
        Vertex::Step(s)
    }

    fn name(s: &str) -> Vertex<&'static str> {
        Vertex::Name(s.to_string())
    }

    #[test]
    fn relinking_merges_counts() {
        let mut refs = ReferenceGraph::new();
        refs.link(step("a"), step("b")).unwrap();
        refs.link(step("a"), step("b")).unwrap();
        assert_eq!(refs.count(&step("a"), &step("b")), Some(2));
        assert_eq!(refs.edge_count(), 1);
    }

    #[test]
    fn edge_survives_until_last_reference_is_dropped() {
        let mut refs = ReferenceGraph::new();
        refs.link(step("a"), step("b")).unwrap();
        refs.link(step("a"), step("b")).unwrap();
        refs.unlink(&step("a"), &step("b"));
        assert_eq!(refs.count(&step("a"), &step("b")), Some(1));
        refs.unlink(&step("a"), &step("b"));
        assert_eq!(refs.count(&step("a"), &step("b")), None);
        assert!(!refs.contains(&step("a")));
        assert!(!refs.contains(&step("b")));
    }

    #[test]
    fn unlinking_unknown_edge_is_a_no_op() {
        let mut refs: ReferenceGraph<&str> = ReferenceGraph::new();
        refs.unlink(&step("a"), &step("b"));
        assert_eq!(refs.edge_count(), 0);
    }

    #[test]
    fn cycle_forming_link_is_rejected() {
        let mut refs = ReferenceGraph::new();
        refs.link(step("a"), name("x")).unwrap();
        refs.link(name("x"), step("b")).unwrap();
        let err = refs.link(step("b"), step("a")).unwrap_err();
        assert_eq!(err.from, "Step(\"b\")");
        assert_eq!(err.to, "Step(\"a\")");
        assert_eq!(refs.edge_count(), 2);
        assert!(refs.link(step("a"), step("a")).is_err());
    }

    #[test]
    fn existing_edge_can_always_gain_references() {
        let mut refs = ReferenceGraph::new();
        refs.link(step("a"), step("b")).unwrap();
        refs.link(step("b"), step("c")).unwrap();
        assert!(refs.link(step("a"), step("b")).is_ok());
    }

    #[test]
    fn unlink_all_returns_the_count() {
        let mut refs = ReferenceGraph::new();
        refs.link_counted(step("a"), step("b"), 3).unwrap();
        assert_eq!(refs.unlink_all(&step("a"), &step("b")), Some(3));
        assert_eq!(refs.unlink_all(&step("a"), &step("b")), None);
    }

    #[test]
    fn path_links_every_adjacent_pair() {
        let mut refs = ReferenceGraph::new();
        let path = Path::from(vec!["r", "a", "b"]);
        refs.link_path(&path).unwrap();
        assert_eq!(refs.count(&step("r"), &step("a")), Some(1));
        assert_eq!(refs.count(&step("a"), &step("b")), Some(1));
        refs.unlink_path(&path);
        assert_eq!(refs.edge_count(), 0);
    }

    #[test]
    fn upstream_is_topologically_ordered() {
        let mut refs = ReferenceGraph::new();
        refs.link(step("r"), name("y")).unwrap();
        refs.link(step("r"), step("b")).unwrap();
        refs.link(name("y"), step("b")).unwrap();
        refs.link(step("b"), name("x")).unwrap();
        refs.link(step("b"), step("a")).unwrap();
        refs.link(name("x"), step("a")).unwrap();

        let order = refs.upstream(&step("a"));
        assert_eq!(order.len(), 5);
        assert_eq!(order.last(), Some(&&step("a")));
        let pos = |v: &Vertex<&'static str>| order.iter().position(|o| *o == v).unwrap();
        assert!(pos(&step("r")) < pos(&name("y")));
        assert!(pos(&name("y")) < pos(&step("b")));
        assert!(pos(&step("b")) < pos(&name("x")));
        assert!(refs.upstream(&step("missing")).is_empty());
    }

    #[test]
    fn replace_renames_fresh_step() {
        let mut refs = ReferenceGraph::new();
        refs.link_counted(step("r"), step("a"), 2).unwrap();
        refs.link(name("x"), step("a")).unwrap();
        refs.replace(&"a", &"z").unwrap();
        assert_eq!(refs.count(&step("r"), &step("z")), Some(2));
        assert_eq!(refs.count(&name("x"), &step("z")), Some(1));
        assert!(!refs.contains(&step("a")));
    }

    #[test]
    fn replace_merges_counts_into_existing_step() {
        let mut refs = ReferenceGraph::new();
        refs.link(step("r"), step("a")).unwrap();
        refs.link(step("r"), step("b")).unwrap();
        refs.replace(&"a", &"b").unwrap();
        assert_eq!(refs.count(&step("r"), &step("b")), Some(2));
    }

    #[test]
    fn replace_rejects_merge_that_closes_a_cycle() {
        let mut refs = ReferenceGraph::new();
        refs.link(step("a"), step("b")).unwrap();
        refs.link(step("b"), step("c")).unwrap();
        assert!(refs.replace(&"c", &"a").is_err());
    }
}
