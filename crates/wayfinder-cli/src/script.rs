//! Session scripts: a JSON description of a dataflow session.
//!
//! A script names the root step, the names each step reads, and a list of
//! operations to replay. Model operations rebuild the window around the new
//! current path; navigation operations move the focus within it.
//!
//! ```json
//! {
//!   "root": "R",
//!   "dependencies": { "A": ["x"] },
//!   "steps": [
//!     { "op": "bind", "bindings": { "x": ["R"] } },
//!     { "op": "extend", "step": "A" },
//!     { "op": "move", "direction": "left" }
//!   ]
//! }
//! ```

use std::collections::BTreeSet;
use std::path::Path as FsPath;

use indexmap::IndexMap;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use wayfinder_core::{Dataflow, DataflowError, Layout, Path};

/// A parsed session script.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Script {
    pub root: String,
    /// Names read by each step. Steps not listed read nothing.
    #[serde(default)]
    pub dependencies: IndexMap<String, BTreeSet<String>>,
    #[serde(default)]
    pub steps: Vec<Op>,
}

/// A single replayed operation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", deny_unknown_fields)]
pub enum Op {
    Extend { step: String },
    Begin { step: String },
    Select { path: Vec<String> },
    Bind { bindings: IndexMap<String, Vec<String>> },
    Replace { from: String, to: String },
    Reroute { from: String, to: String },
    Interpose { from: String, to: String, step: String },
    Move { direction: Direction },
    MoveTo { row: i32, col: i32 },
    Recenter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Op::Extend { .. } => "extend",
            Op::Begin { .. } => "begin",
            Op::Select { .. } => "select",
            Op::Bind { .. } => "bind",
            Op::Replace { .. } => "replace",
            Op::Reroute { .. } => "reroute",
            Op::Interpose { .. } => "interpose",
            Op::Move { .. } => "move",
            Op::MoveTo { .. } => "move_to",
            Op::Recenter => "recenter",
        }
    }
}

/// Errors from loading or replaying a script.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("failed to read script '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse script: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("root step rejected: {0}")]
    Root(#[source] DataflowError),

    #[error("step {index} ({op}) failed: {source}")]
    Step {
        index: usize,
        op: &'static str,
        #[source]
        source: DataflowError,
    },
}

impl ScriptError {
    /// Process exit code: 1 when the script itself is unusable, 2 when the
    /// model rejected an operation.
    pub fn exit_code(&self) -> i32 {
        match self {
            ScriptError::Io { .. } | ScriptError::Parse(_) => 1,
            ScriptError::Root(_) | ScriptError::Step { .. } => 2,
        }
    }
}

impl Script {
    pub fn load(path: &FsPath) -> Result<Self, ScriptError> {
        let text = std::fs::read_to_string(path).map_err(|source| ScriptError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Replays every operation, stopping at the first the model rejects.
    pub fn replay(&self) -> Result<Layout<String>, ScriptError> {
        let table = self.dependencies.clone();
        let reads = move |step: &String| table.get(step).cloned().unwrap_or_default();
        let dataflow = Dataflow::new(self.root.clone(), reads).map_err(ScriptError::Root)?;

        let mut layout = Layout::ordered(dataflow);
        for (index, op) in self.steps.iter().enumerate() {
            layout = apply(&layout, op).map_err(|source| ScriptError::Step {
                index,
                op: op.name(),
                source,
            })?;
            debug!(index, op = op.name(), focus = ?layout.focus().path, "replayed step");
        }
        Ok(layout)
    }
}

fn apply(layout: &Layout<String>, op: &Op) -> Result<Layout<String>, DataflowError> {
    let model = layout.dataflow();
    let updated = match op {
        Op::Extend { step } => model.extend(step.clone())?,
        Op::Begin { step } => model.begin(step.clone())?,
        Op::Select { path } => model.select(to_path(path))?,
        Op::Bind { bindings } => {
            model.bind_all(bindings.iter().map(|(name, path)| (name.as_str(), to_path(path))))?
        }
        Op::Replace { from, to } => model.replace(from, to)?,
        Op::Reroute { from, to } => model.reroute(from, to)?,
        Op::Interpose { from, to, step } => model.interpose(from, to, step.clone())?,
        Op::Move { direction } => {
            return Ok(match direction {
                Direction::Up => layout.up(),
                Direction::Down => layout.down(),
                Direction::Left => layout.left(),
                Direction::Right => layout.right(),
            });
        }
        Op::MoveTo { row, col } => return Ok(layout.move_to(*row, *col)),
        Op::Recenter => return layout.recenter(),
    };
    Ok(Layout::ordered(updated))
}

fn to_path(steps: &[String]) -> Path<String> {
    steps.iter().cloned().collect()
}
