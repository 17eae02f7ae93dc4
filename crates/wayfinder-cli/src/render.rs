//! Text and JSON renderings of a layout window.

use serde::Serialize;

use wayfinder_core::{Layout, Node, Path};

/// Machine-readable snapshot of a window.
#[derive(Debug, Serialize)]
pub struct WindowView<'a> {
    pub path: &'a Path<String>,
    pub path_dependencies: Vec<String>,
    pub focus: &'a Node<String>,
    pub breadcrumb: &'a [Node<String>],
    pub nodes: Vec<&'a Node<String>>,
}

impl<'a> WindowView<'a> {
    pub fn new(layout: &'a Layout<String>) -> Self {
        WindowView {
            path: layout.dataflow().path(),
            path_dependencies: layout.dataflow().path_dependencies(),
            focus: layout.focus(),
            breadcrumb: layout.breadcrumb(),
            nodes: layout.nodes().collect(),
        }
    }
}

pub fn json(layout: &Layout<String>) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&WindowView::new(layout))
}

/// One line per materialised row, top to bottom. Each cell is printed as
/// `col:path` with the focus wrapped in angle brackets.
pub fn text(layout: &Layout<String>) -> String {
    let dataflow = layout.dataflow();
    let reads = dataflow.path_dependencies();
    let mut lines = vec![
        format!("path: {}", steps(dataflow.path())),
        format!(
            "reads: {}",
            if reads.is_empty() { "(none)".to_string() } else { reads.join(", ") }
        ),
    ];
    for row in layout.min_row()..=layout.max_row() {
        let cells: Vec<String> = layout
            .row(row)
            .map(|node| {
                if node == layout.focus() {
                    format!("{}:<{}>", node.col, steps(&node.path))
                } else {
                    format!("{}:{}", node.col, steps(&node.path))
                }
            })
            .collect();
        lines.push(format!("row {row}: {}", cells.join("  ")));
    }
    lines.join("\n")
}

/// The final path as plain text, steps joined by `/`.
pub fn steps(path: &Path<String>) -> String {
    path.join("/")
}
