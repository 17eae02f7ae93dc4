//! Dataflow: an immutable model of a branching computation.
//!
//! [`Dataflow`] ties together four pieces:
//! - the [`HistoryGraph`] of every step edge ever created,
//! - the current [`Path`] selected through that graph,
//! - the lexical bindings of names onto paths,
//! - the [`ReferenceGraph`] counting which edges live paths rely on.
//!
//! Every operation takes `&self` and returns a new `Dataflow`. Each component
//! sits behind an `Arc`; an operation clones only the components it changes
//! (via `Arc::make_mut`) and shares the rest with its receiver. A failed
//! operation drops its private copies, so the receiver is never observed in a
//! partially updated state.

use std::collections::BTreeSet;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use crate::error::DataflowError;
use crate::history::HistoryGraph;
use crate::path::Path;
use crate::reference::{ReferenceGraph, Vertex};

/// Requirements on a step: compared by equality and hash, printable for errors.
pub trait Step: Clone + Eq + Hash + fmt::Debug {}

impl<T: Clone + Eq + Hash + fmt::Debug> Step for T {}

/// Maps a step onto the lexical names it reads.
///
/// Must be a pure function: the model assumes the answer for a given step
/// never changes over its lifetime.
pub trait Dependencies<V>: Send + Sync {
    fn dependencies(&self, step: &V) -> BTreeSet<String>;
}

impl<V, F> Dependencies<V> for F
where
    F: Fn(&V) -> BTreeSet<String> + Send + Sync,
{
    fn dependencies(&self, step: &V) -> BTreeSet<String> {
        self(step)
    }
}

/// Lexical bindings of names onto the paths computing their values.
pub type Bindings<V> = IndexMap<String, Path<V>>;

/// An immutable history of steps with a selected path and lexical bindings.
pub struct Dataflow<V> {
    history: Arc<HistoryGraph<V>>,
    references: Arc<ReferenceGraph<V>>,
    path: Path<V>,
    bindings: Arc<Bindings<V>>,
    dependencies: Arc<dyn Dependencies<V>>,
}

impl<V> Clone for Dataflow<V> {
    fn clone(&self) -> Self {
        Dataflow {
            history: Arc::clone(&self.history),
            references: Arc::clone(&self.references),
            path: self.path.clone(),
            bindings: Arc::clone(&self.bindings),
            dependencies: Arc::clone(&self.dependencies),
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for Dataflow<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dataflow")
            .field("path", &self.path)
            .field("bindings", &self.bindings)
            .field("history", &self.history)
            .field("references", &self.references)
            .finish_non_exhaustive()
    }
}

impl<V: Step> Dataflow<V> {
    /// Creates a model whose history holds the single step `root`.
    ///
    /// Nothing is bound yet, so `root` must not read any name.
    pub fn new(root: V, dependencies: impl Dependencies<V> + 'static) -> Result<Self, DataflowError> {
        let dependencies: Arc<dyn Dependencies<V>> = Arc::new(dependencies);
        let reads = dependencies.dependencies(&root);
        if !reads.is_empty() {
            return Err(DataflowError::unsatisfied(&root, reads.into_iter().collect()));
        }

        let mut history = HistoryGraph::new();
        history.add_step(root.clone());
        debug!(root = ?root, "created dataflow");

        Ok(Dataflow {
            history: Arc::new(history),
            references: Arc::new(ReferenceGraph::new()),
            path: Path::single(root),
            bindings: Arc::new(Bindings::new()),
            dependencies,
        })
    }

    // -----------------------------------------------------------------------
    // Read-only accessors
    // -----------------------------------------------------------------------

    /// The currently selected path. Never empty.
    pub fn path(&self) -> &Path<V> {
        &self.path
    }

    pub fn bindings(&self) -> &Bindings<V> {
        &self.bindings
    }

    pub fn history(&self) -> &HistoryGraph<V> {
        &self.history
    }

    pub fn references(&self) -> &ReferenceGraph<V> {
        &self.references
    }

    pub fn is_root(&self, step: &V) -> bool {
        self.history.is_root(step)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// The paths currently bound to each name `step` reads.
    ///
    /// Names the step reads which are not bound are left out.
    pub fn dependencies(&self, step: &V) -> Bindings<V> {
        self.dependencies
            .dependencies(step)
            .into_iter()
            .filter_map(|name| {
                let path = self.bindings.get(&name)?.clone();
                Some((name, path))
            })
            .collect()
    }

    /// Every name the current path transitively reads, in evaluation order:
    /// a name always comes after the names its own binding needs.
    pub fn path_dependencies(&self) -> Vec<String> {
        let Some(last) = self.path.last() else {
            return Vec::new();
        };
        self.references
            .upstream(&Vertex::Step(last.clone()))
            .into_iter()
            .filter_map(|vertex| vertex.as_name().map(str::to_owned))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Path algebra
    // -----------------------------------------------------------------------

    /// Appends `step` to the current path.
    ///
    /// Every name `step` reads must be bound. The history gains the edge from
    /// the current last step (if it is new); the reference graph gains a chain
    /// reference and one dependency reference per name read.
    pub fn extend(&self, step: V) -> Result<Self, DataflowError> {
        let reads = self.bound_reads(&step)?;
        let last = self.tip()?.clone();

        let mut references = Arc::clone(&self.references);
        let refs = Arc::make_mut(&mut references);
        refs.link(Vertex::Step(last.clone()), Vertex::Step(step.clone()))?;
        for name in reads {
            refs.link(Vertex::Name(name), Vertex::Step(step.clone()))?;
        }

        let mut history = Arc::clone(&self.history);
        Arc::make_mut(&mut history).link(&last, &step);

        let path = self.path.push(step);
        debug!(len = path.len(), step = ?path.last(), "extended path");

        Ok(Dataflow {
            history,
            references,
            path,
            ..self.clone()
        })
    }

    /// Starts a new route at `root`, which must not have any predecessor.
    pub fn begin(&self, root: V) -> Result<Self, DataflowError> {
        if !self.history.is_root(&root) {
            return Err(DataflowError::invalid_path(format!(
                "{root:?} has predecessors and cannot start a route"
            )));
        }
        let reads = self.bound_reads(&root)?;

        let mut references = Arc::clone(&self.references);
        let refs = Arc::make_mut(&mut references);
        refs.unlink_path(&self.path);
        for name in reads {
            refs.link(Vertex::Name(name), Vertex::Step(root.clone()))?;
        }

        let mut history = Arc::clone(&self.history);
        Arc::make_mut(&mut history).add_step(root.clone());
        debug!(root = ?root, "began new route");

        Ok(Dataflow {
            history,
            references,
            path: Path::single(root),
            ..self.clone()
        })
    }

    /// Switches the current path to an existing route through the history.
    pub fn select(&self, path: Path<V>) -> Result<Self, DataflowError> {
        self.validate(&path)?;

        let mut references = Arc::clone(&self.references);
        let refs = Arc::make_mut(&mut references);
        refs.unlink_path(&self.path);
        refs.link_path(&path)?;
        debug!(len = path.len(), "selected path");

        Ok(Dataflow {
            references,
            path,
            ..self.clone()
        })
    }

    /// Binds `name` to `path`. See [`bind_all`](Self::bind_all).
    pub fn bind(&self, name: impl Into<String>, path: Path<V>) -> Result<Self, DataflowError> {
        self.bind_all([(name.into(), path)])
    }

    /// Rebinds every name in `bindings` as one unit.
    ///
    /// The references held by every old binding in the batch are dropped
    /// before any new one is taken, so names which swap paths between each
    /// other are only rejected when the new bindings really form a cycle.
    pub fn bind_all<I, K>(&self, bindings: I) -> Result<Self, DataflowError>
    where
        I: IntoIterator<Item = (K, Path<V>)>,
        K: Into<String>,
    {
        let bindings: Bindings<V> = bindings
            .into_iter()
            .map(|(name, path)| (name.into(), path))
            .collect();
        self.validate(&self.path)?;
        for path in bindings.values() {
            self.validate(path)?;
        }

        let mut references = Arc::clone(&self.references);
        let refs = Arc::make_mut(&mut references);
        for name in bindings.keys() {
            if let Some(old) = self.bindings.get(name) {
                refs.unlink_path(old);
                if let Some(last) = old.last() {
                    refs.unlink(&Vertex::Step(last.clone()), &Vertex::Name(name.clone()));
                }
            }
        }
        for (name, path) in &bindings {
            refs.link_path(path)?;
            if let Some(last) = path.last() {
                refs.link(Vertex::Step(last.clone()), Vertex::Name(name.clone()))?;
            }
        }

        let mut merged = Bindings::clone(&self.bindings);
        debug!(names = ?bindings.keys().collect::<Vec<_>>(), "rebound names");
        merged.extend(bindings);

        let next = Dataflow {
            references,
            bindings: Arc::new(merged),
            ..self.clone()
        };
        #[cfg(debug_assertions)]
        next.assert_consistency();
        Ok(next)
    }

    /// Substitutes `b` for every occurrence of `a`, rewriting history.
    ///
    /// Prefer [`reroute`](Self::reroute), which keeps the old route around.
    pub fn replace(&self, a: &V, b: &V) -> Result<Self, DataflowError> {
        let mut references = Arc::clone(&self.references);
        Arc::make_mut(&mut references).replace(a, b)?;

        let mut history = Arc::clone(&self.history);
        Arc::make_mut(&mut history).replace(a, b);
        debug!(from = ?a, to = ?b, "replaced step");

        let next = Dataflow {
            history,
            references,
            path: self.path.substitute(a, b),
            bindings: Arc::new(self.map_bindings(|path| path.substitute(a, b))),
            dependencies: Arc::clone(&self.dependencies),
        };
        #[cfg(debug_assertions)]
        next.assert_consistency();
        Ok(next)
    }

    /// Makes every route through `a` also available through `b`, and moves
    /// the current path and every binding onto `b`.
    pub fn reroute(&self, a: &V, b: &V) -> Result<Self, DataflowError> {
        let mut references = Arc::clone(&self.references);
        Arc::make_mut(&mut references).replace(a, b)?;

        let rename = |step: &V| if step == a { b.clone() } else { step.clone() };
        let predecessors: Vec<V> = self.history.predecessors(a).map(rename).collect();
        let successors: Vec<V> = self.history.successors(a).map(rename).collect();

        let mut history = Arc::clone(&self.history);
        let graph = Arc::make_mut(&mut history);
        graph.add_step(b.clone());
        for pred in &predecessors {
            graph.link(pred, b);
        }
        for succ in &successors {
            graph.link(b, succ);
        }
        debug!(
            from = ?a,
            to = ?b,
            predecessors = predecessors.len(),
            successors = successors.len(),
            "rerouted step"
        );

        let next = Dataflow {
            history,
            references,
            path: self.path.substitute(a, b),
            bindings: Arc::new(self.map_bindings(|path| path.substitute(a, b))),
            dependencies: Arc::clone(&self.dependencies),
        };
        #[cfg(debug_assertions)]
        next.assert_consistency();
        Ok(next)
    }

    /// Splices `v` into every route going directly from `a` to `b`.
    ///
    /// A live reference edge `a -> b` is replaced by `a -> v -> b` carrying
    /// the same count, and `v` takes a reference on every name it reads. The
    /// current path and every binding get `v` inserted into their first
    /// `(a, b)` adjacency.
    ///
    /// Every name `v` reads must be bound even when no live `a -> b` edge
    /// exists: `v` still joins the history, and a route later selected
    /// through it reads those names.
    pub fn interpose(&self, a: &V, b: &V, v: V) -> Result<Self, DataflowError> {
        let reads = self.bound_reads(&v)?;
        let (from, to, step) = (
            Vertex::Step(a.clone()),
            Vertex::Step(b.clone()),
            Vertex::Step(v.clone()),
        );

        let mut references = Arc::clone(&self.references);
        if let Some(count) = self.references.count(&from, &to) {
            let refs = Arc::make_mut(&mut references);
            refs.unlink_all(&from, &to);
            refs.link_counted(from, step.clone(), count)?;
            refs.link_counted(step.clone(), to, count)?;
            for name in reads {
                refs.link(Vertex::Name(name), step.clone())?;
            }
        }

        let mut history = Arc::clone(&self.history);
        let graph = Arc::make_mut(&mut history);
        graph.link(a, &v);
        graph.link(&v, b);
        debug!(from = ?a, to = ?b, step = ?v, "interposed step");

        let next = Dataflow {
            history,
            references,
            path: self.path.splice(a, b, &v),
            bindings: Arc::new(self.map_bindings(|path| path.splice(a, b, &v))),
            dependencies: Arc::clone(&self.dependencies),
        };
        #[cfg(debug_assertions)]
        next.assert_consistency();
        Ok(next)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn tip(&self) -> Result<&V, DataflowError> {
        self.path
            .last()
            .ok_or_else(|| DataflowError::invalid_path("current path is empty"))
    }

    /// The names `step` reads, provided every one of them is bound.
    fn bound_reads(&self, step: &V) -> Result<BTreeSet<String>, DataflowError> {
        let reads = self.dependencies.dependencies(step);
        let missing: Vec<String> = reads
            .iter()
            .filter(|name| !self.bindings.contains_key(*name))
            .cloned()
            .collect();
        if missing.is_empty() {
            Ok(reads)
        } else {
            Err(DataflowError::unsatisfied(step, missing))
        }
    }

    /// Checks that `path` starts at a root and only uses known edges.
    fn validate(&self, path: &Path<V>) -> Result<(), DataflowError> {
        let Some(first) = path.first() else {
            return Err(DataflowError::invalid_path("path is empty"));
        };
        if !self.history.contains(first) {
            return Err(DataflowError::invalid_path(format!(
                "{first:?} is not part of the history"
            )));
        }
        if !self.history.is_root(first) {
            return Err(DataflowError::invalid_path(format!(
                "path must begin at a root, but {first:?} has predecessors"
            )));
        }
        for (pred, succ) in path.edges() {
            if !self.history.contains_edge(pred, succ) {
                return Err(DataflowError::invalid_path(format!(
                    "edge {pred:?} -> {succ:?} does not exist in the history"
                )));
            }
        }
        Ok(())
    }

    /// Verifies that the reference graph is still acyclic and the current
    /// path is not empty.
    ///
    /// Only called in debug builds (via `cfg(debug_assertions)`).
    #[cfg(debug_assertions)]
    fn assert_consistency(&self) {
        assert!(!self.path.is_empty(), "current path is empty");
        assert!(
            self.references.is_acyclic(),
            "reference graph contains a cycle"
        );
    }

    fn map_bindings(&self, f: impl Fn(&Path<V>) -> Path<V>) -> Bindings<V> {
        self.bindings
            .iter()
            .map(|(name, path)| (name.clone(), f(path)))
            .collect()
    }
}
