//! Layout: a sparse 2-D window over a [`Dataflow`].
//!
//! Rows are the ancestor/descendant axis: row `0` holds the focus, negative
//! rows hold prefixes of a path, positive rows hold extensions of it. Columns
//! order siblings, and lexical dependencies open new columns to the right of
//! the step that reads them.
//!
//! A window is only materialised around its breadcrumb (the chain of nodes
//! from the window root to the focus). Each breadcrumb entry places:
//! - its strict prefixes upwards in its own column, up to the first cell that
//!   was already taken,
//! - the paths bound to the names its last step reads, to its right,
//! - every history successor of its last step, one row down.
//!
//! Moving the focus rebuilds a fresh window from the new breadcrumb.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataflow::{Dataflow, Step};
use crate::error::DataflowError;
use crate::path::Path;

/// A total order over paths, used to sort siblings and lexical columns.
pub type PathOrder<V> = Arc<dyn Fn(&Path<V>, &Path<V>) -> Ordering + Send + Sync>;

/// A placed path.
#[derive(Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node<V> {
    pub row: i32,
    pub col: i32,
    pub path: Path<V>,
}

impl<V> Clone for Node<V> {
    fn clone(&self) -> Self {
        Node {
            row: self.row,
            col: self.col,
            path: self.path.clone(),
        }
    }
}

impl<V> Node<V> {
    pub fn new(row: i32, col: i32, path: Path<V>) -> Self {
        Node { row, col, path }
    }
}

/// The materialised cells of a window and how each was reached.
#[derive(Debug)]
struct Window<V> {
    rows: BTreeMap<i32, BTreeMap<i32, Node<V>>>,
    parent: HashMap<Node<V>, Node<V>>,
}

impl<V: Step> Window<V> {
    fn new(root: &Node<V>) -> Self {
        let mut window = Window {
            rows: BTreeMap::new(),
            parent: HashMap::new(),
        };
        window.place(None, root.clone());
        window
    }

    /// Places `node`, replacing any earlier occupant of its cell, and records
    /// `parent` as the entry that placed it. Returns whether the cell was
    /// empty.
    fn place(&mut self, parent: Option<&Node<V>>, node: Node<V>) -> bool {
        let fresh = self
            .rows
            .entry(node.row)
            .or_default()
            .insert(node.col, node.clone())
            .is_none();
        if let Some(parent) = parent {
            self.parent.insert(node, parent.clone());
        }
        fresh
    }

    fn len(&self) -> usize {
        self.rows.values().map(BTreeMap::len).sum()
    }
}

/// A window onto a dataflow, focused on one node.
pub struct Layout<V> {
    dataflow: Dataflow<V>,
    window: Arc<Window<V>>,
    breadcrumb: Arc<[Node<V>]>,
    focus: Node<V>,
    order: PathOrder<V>,
}

impl<V> Clone for Layout<V> {
    fn clone(&self) -> Self {
        Layout {
            dataflow: self.dataflow.clone(),
            window: Arc::clone(&self.window),
            breadcrumb: Arc::clone(&self.breadcrumb),
            focus: self.focus.clone(),
            order: Arc::clone(&self.order),
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for Layout<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layout")
            .field("focus", &self.focus)
            .field("breadcrumb", &self.breadcrumb)
            .field("rows", &self.window.rows)
            .finish_non_exhaustive()
    }
}

impl<V: Step + Ord + 'static> Layout<V> {
    /// A window using the natural lexicographic order of paths.
    pub fn ordered(dataflow: Dataflow<V>) -> Self {
        Layout::new(dataflow, |a: &Path<V>, b: &Path<V>| a.cmp(b))
    }
}

impl<V: Step> Layout<V> {
    /// A window focused at `(0, 0)` on the dataflow's current path.
    pub fn new(
        dataflow: Dataflow<V>,
        order: impl Fn(&Path<V>, &Path<V>) -> Ordering + Send + Sync + 'static,
    ) -> Self {
        Layout::with_order(dataflow, Arc::new(order))
    }

    pub fn with_order(dataflow: Dataflow<V>, order: PathOrder<V>) -> Self {
        let focus = Node::new(0, 0, dataflow.path().clone());
        Layout::build(dataflow, Vec::new(), focus, order)
    }

    /// Builds the window around `trail` followed by `focus`.
    fn build(dataflow: Dataflow<V>, mut trail: Vec<Node<V>>, focus: Node<V>, order: PathOrder<V>) -> Self {
        trail.push(focus.clone());
        let mut window = Window::new(&trail[0]);

        for entry in &trail {
            if entry.row <= 0 {
                // direct ancestors, up to the first cell already taken
                for (row, prefix) in (i32::MIN..entry.row).rev().zip(entry.path.ancestors()) {
                    if !window.place(Some(entry), Node::new(row, entry.col, prefix)) {
                        break;
                    }
                }

                // lexical ancestors
                if let Some(last) = entry.path.last() {
                    let mut deps: Vec<Path<V>> = dataflow.dependencies(last).into_values().collect();
                    deps.sort_by(|a, b| order(a, b));
                    for (col, path) in (entry.col + 1..).zip(deps) {
                        window.place(Some(entry), Node::new(entry.row, col, path));
                    }
                }
            }

            if entry.row >= 0 {
                if let Some(last) = entry.path.last() {
                    let mut children: Vec<Path<V>> = dataflow
                        .history()
                        .successors(last)
                        .map(|step| entry.path.push(step.clone()))
                        .collect();
                    children.sort_by(|a, b| order(a, b));
                    for (col, path) in (entry.col..).zip(children) {
                        window.place(Some(entry), Node::new(entry.row + 1, col, path));
                    }
                }
            }
        }

        debug!(
            breadcrumb = trail.len(),
            nodes = window.len(),
            rows = window.rows.len(),
            "built layout window"
        );

        Layout {
            dataflow,
            window: Arc::new(window),
            breadcrumb: trail.into(),
            focus,
            order,
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn dataflow(&self) -> &Dataflow<V> {
        &self.dataflow
    }

    pub fn focus(&self) -> &Node<V> {
        &self.focus
    }

    /// Nodes from the window root to the focus.
    pub fn breadcrumb(&self) -> &[Node<V>] {
        &self.breadcrumb
    }

    pub fn min_row(&self) -> i32 {
        self.window.rows.keys().next().copied().unwrap_or(0)
    }

    pub fn max_row(&self) -> i32 {
        self.window.rows.keys().next_back().copied().unwrap_or(0)
    }

    pub fn node_at(&self, row: i32, col: i32) -> Option<&Node<V>> {
        self.window.rows.get(&row)?.get(&col)
    }

    /// The breadcrumb entry that placed `node`; `None` for the window root.
    pub fn parent(&self, node: &Node<V>) -> Option<&Node<V>> {
        self.window.parent.get(node)
    }

    /// The nodes of `row`, left to right.
    pub fn row(&self, row: i32) -> impl Iterator<Item = &Node<V>> + '_ {
        self.window.rows.get(&row).into_iter().flat_map(BTreeMap::values)
    }

    /// Every node, top row first, left to right within a row.
    pub fn nodes(&self) -> impl Iterator<Item = &Node<V>> + '_ {
        self.window.rows.values().flat_map(BTreeMap::values)
    }

    // -----------------------------------------------------------------------
    // Navigation
    // -----------------------------------------------------------------------

    pub fn up(&self) -> Self {
        self.move_to(self.focus.row, self.focus.col - 1)
    }

    pub fn down(&self) -> Self {
        self.move_to(self.focus.row, self.focus.col + 1)
    }

    pub fn left(&self) -> Self {
        self.move_to(self.focus.row - 1, self.focus.col)
    }

    pub fn right(&self) -> Self {
        self.move_to(self.focus.row + 1, self.focus.col)
    }

    /// Focuses the node nearest to `(row, col)`.
    ///
    /// `row` is clamped to the materialised rows. Within the row the node with
    /// the greatest column not past `col` wins, falling back to the first node
    /// of the row.
    pub fn move_to(&self, row: i32, col: i32) -> Self {
        let row = row.clamp(self.min_row(), self.max_row());
        let Some(cells) = self.window.rows.get(&row) else {
            return self.clone();
        };
        let target = cells
            .range(..=col)
            .next_back()
            .or_else(|| cells.iter().next())
            .map(|(_, node)| node);
        let Some(target) = target else {
            return self.clone();
        };
        if *target == self.focus {
            return self.clone();
        }

        let mut trail = Vec::new();
        let mut cursor = target;
        while let Some(parent) = self.window.parent.get(cursor) {
            trail.push(parent.clone());
            cursor = parent;
        }
        trail.reverse();
        Layout::build(self.dataflow.clone(), trail, target.clone(), Arc::clone(&self.order))
    }

    /// Selects the focused path in the dataflow and re-centres on it.
    pub fn recenter(&self) -> Result<Self, DataflowError> {
        let dataflow = self.dataflow.select(self.focus.path.clone())?;
        Ok(Layout::with_order(dataflow, Arc::clone(&self.order)))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn path(steps: &[&'static str]) -> Path<&'static str> {
        Path::from(steps.to_vec())
    }

    fn reads(step: &&'static str) -> BTreeSet<String> {
        match *step {
            "a" => BTreeSet::from(["x".to_string()]),
            "b" => BTreeSet::from(["x".to_string(), "y".to_string()]),
            _ => BTreeSet::new(),
        }
    }

    /// r -> s -> t with siblings r -> u and s -> w; x := [r], y := [r, u].
    fn branching() -> Dataflow<&'static str> {
        let m = Dataflow::new("r", reads).unwrap();
        let m = m.extend("u").unwrap();
        let m = m.select(path(&["r"])).unwrap().extend("s").unwrap().extend("w").unwrap();
        let m = m.select(path(&["r", "s"])).unwrap().extend("t").unwrap();
        m.bind_all([("x", path(&["r"])), ("y", path(&["r", "u"]))]).unwrap()
    }

    fn assert_parent_chain(layout: &Layout<&'static str>) {
        let root = &layout.breadcrumb()[0];
        for node in layout.nodes() {
            if node == root {
                assert!(layout.parent(node).is_none());
                continue;
            }
            let parent = layout.parent(node).expect("every non-root node has a parent");
            assert!(layout.breadcrumb().contains(parent));
        }
        for pair in layout.breadcrumb().windows(2) {
            assert_eq!(layout.parent(&pair[1]), Some(&pair[0]));
        }
    }

    #[test]
    fn focus_starts_at_origin() {
        let layout = Layout::ordered(branching());
        assert_eq!(layout.focus(), &Node::new(0, 0, path(&["r", "s", "t"])));
        assert_eq!(layout.breadcrumb().len(), 1);
        assert_eq!(layout.min_row(), -2);
        assert_eq!(layout.max_row(), 0);
    }

    #[test]
    fn ancestors_fill_the_focus_column() {
        let layout = Layout::ordered(branching());
        assert_eq!(layout.node_at(-1, 0).map(|n| &n.path), Some(&path(&["r", "s"])));
        assert_eq!(layout.node_at(-2, 0).map(|n| &n.path), Some(&path(&["r"])));
        assert_parent_chain(&layout);
    }

    #[test]
    fn children_are_sorted_into_columns() {
        let m = branching().select(path(&["r", "s"])).unwrap();
        let layout = Layout::ordered(m);
        let row: Vec<_> = layout.row(1).map(|n| (n.col, n.path.clone())).collect();
        assert_eq!(row, vec![(0, path(&["r", "s", "t"])), (1, path(&["r", "s", "w"]))]);
    }

    #[test]
    fn lexical_dependencies_open_columns_to_the_right() {
        let m = branching().select(path(&["r", "s", "t"])).unwrap();
        let m = m.extend("b").unwrap();
        let layout = Layout::ordered(m);
        assert_eq!(layout.node_at(0, 1).map(|n| &n.path), Some(&path(&["r"])));
        assert_eq!(layout.node_at(0, 2).map(|n| &n.path), Some(&path(&["r", "u"])));
        assert_parent_chain(&layout);
    }

    #[test]
    fn custom_order_reverses_columns() {
        let m = branching().select(path(&["r", "s"])).unwrap();
        let layout = Layout::new(m, |a: &Path<&'static str>, b: &Path<&'static str>| b.cmp(a));
        assert_eq!(layout.node_at(1, 0).map(|n| &n.path), Some(&path(&["r", "s", "w"])));
        assert_eq!(layout.node_at(1, 1).map(|n| &n.path), Some(&path(&["r", "s", "t"])));
    }

    #[test]
    fn moving_rebuilds_around_the_new_breadcrumb() {
        let m = branching().select(path(&["r", "s"])).unwrap();
        let layout = Layout::ordered(m);
        let moved = layout.right().down();
        assert_eq!(moved.focus(), &Node::new(1, 1, path(&["r", "s", "w"])));
        assert_eq!(moved.breadcrumb().len(), 2);
        assert_eq!(moved.breadcrumb()[0], *layout.focus());
        assert_parent_chain(&moved);
    }

    #[test]
    fn up_then_down_returns_to_the_same_node() {
        let m = branching().select(path(&["r", "s"])).unwrap();
        let start = Layout::ordered(m).right().down();
        let back = start.up().down();
        assert_eq!(back.focus(), start.focus());
        assert_eq!(start.up().focus(), &Node::new(1, 0, path(&["r", "s", "t"])));
    }

    #[test]
    fn moves_clamp_at_window_edges() {
        let layout = Layout::ordered(branching());
        let top = layout.move_to(-100, 0);
        assert_eq!(top.focus().row, layout.min_row());
        let bottom = layout.move_to(100, 0);
        assert_eq!(bottom.focus(), layout.focus());
        let before_first_column = layout.up();
        assert_eq!(before_first_column.focus(), layout.focus());
    }

    #[test]
    fn moving_onto_the_focus_is_a_no_op() {
        let layout = Layout::ordered(branching());
        let same = layout.move_to(0, 0);
        assert!(Arc::ptr_eq(&layout.window, &same.window));
    }

    #[test]
    fn later_entries_own_the_cells_they_place() {
        // r -> a -> {c, d} and r -> q, with a reading x := [r]
        let m = Dataflow::new("r", reads).unwrap().bind("x", path(&["r"])).unwrap();
        let m = m.extend("a").unwrap().extend("c").unwrap();
        let m = m.select(path(&["r", "a"])).unwrap().extend("d").unwrap();
        let m = m.select(path(&["r"])).unwrap().extend("q").unwrap();
        let layout = Layout::ordered(m.select(path(&["r", "a"])).unwrap());
        assert_eq!(layout.node_at(1, 1).map(|n| &n.path), Some(&path(&["r", "a", "d"])));

        let lexical = layout.down();
        assert_eq!(lexical.focus(), &Node::new(0, 1, path(&["r"])));
        assert_eq!(lexical.node_at(1, 0).map(|n| &n.path), Some(&path(&["r", "a", "c"])));
        assert_eq!(lexical.node_at(1, 1).map(|n| &n.path), Some(&path(&["r", "a"])));
        assert_eq!(lexical.node_at(1, 2).map(|n| &n.path), Some(&path(&["r", "q"])));

        let child = lexical.right();
        assert_eq!(child.focus(), &Node::new(1, 1, path(&["r", "a"])));
        assert_eq!(child.parent(child.focus()), Some(lexical.focus()));
        assert_eq!(child.breadcrumb().len(), 3);
        assert_parent_chain(&child);
    }

    #[test]
    fn recenter_selects_the_focused_path() {
        let m = branching().select(path(&["r", "s"])).unwrap();
        let layout = Layout::ordered(m).right().down();
        let centred = layout.recenter().unwrap();
        assert_eq!(centred.dataflow().path(), &path(&["r", "s", "w"]));
        assert_eq!(centred.focus(), &Node::new(0, 0, path(&["r", "s", "w"])));
        assert_eq!(centred.breadcrumb().len(), 1);
    }
}
