//! Immutable step sequences.
//!
//! A [`Path`] is a route through the history graph. Paths are backed by an
//! `Arc<[V]>`, so the current path, every binding and every layout node can
//! share the same allocation. Operations that would not change a path return
//! a clone of the original handle instead of copying the steps.

use std::ops::Deref;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// An immutable, cheaply cloned sequence of steps.
///
/// Ordering is lexicographic over the steps, which makes `Path` usable as the
/// default sibling order of a [`Layout`](crate::layout::Layout).
#[derive(Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path<V>(Arc<[V]>);

impl<V> Clone for Path<V> {
    fn clone(&self) -> Self {
        Path(Arc::clone(&self.0))
    }
}

impl<V> Path<V> {
    /// A path holding exactly one step.
    pub fn single(step: V) -> Self {
        Path(Arc::from(vec![step]))
    }

    pub fn as_slice(&self) -> &[V] {
        &self.0
    }

    /// Adjacent `(predecessor, successor)` pairs in order.
    pub fn edges(&self) -> impl Iterator<Item = (&V, &V)> + '_ {
        self.0.windows(2).map(|pair| (&pair[0], &pair[1]))
    }
}

impl<V: Clone> Path<V> {
    /// Returns a new path with `step` appended.
    pub fn push(&self, step: V) -> Self {
        let mut steps = Vec::with_capacity(self.0.len() + 1);
        steps.extend_from_slice(&self.0);
        steps.push(step);
        Path(steps.into())
    }

    /// The path without its last step, or `None` once only one step is left.
    pub fn parent(&self) -> Option<Self> {
        match self.0.len() {
            0 | 1 => None,
            n => Some(Path(self.0[..n - 1].into())),
        }
    }

    /// Strict prefixes, longest first.
    pub fn ancestors(&self) -> impl Iterator<Item = Path<V>> {
        std::iter::successors(self.parent(), Path::parent)
    }
}

impl<V: Clone + PartialEq> Path<V> {
    /// Substitutes `to` for every occurrence of `from`.
    pub fn substitute(&self, from: &V, to: &V) -> Self {
        if !self.0.contains(from) {
            return self.clone();
        }
        self.0
            .iter()
            .map(|step| if step == from { to.clone() } else { step.clone() })
            .collect()
    }

    /// Inserts `step` between the first adjacent `(a, b)` pair, if any.
    pub fn splice(&self, a: &V, b: &V, step: &V) -> Self {
        let Some(i) = self.0.windows(2).position(|pair| &pair[0] == a && &pair[1] == b) else {
            return self.clone();
        };
        let mut steps = Vec::with_capacity(self.0.len() + 1);
        steps.extend_from_slice(&self.0[..=i]);
        steps.push(step.clone());
        steps.extend_from_slice(&self.0[i + 1..]);
        Path(steps.into())
    }
}

impl<V> Deref for Path<V> {
    type Target = [V];

    fn deref(&self) -> &[V] {
        &self.0
    }
}

impl<V> From<Vec<V>> for Path<V> {
    fn from(steps: Vec<V>) -> Self {
        Path(steps.into())
    }
}

impl<V> FromIterator<V> for Path<V> {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Path(iter.into_iter().collect())
    }
}
