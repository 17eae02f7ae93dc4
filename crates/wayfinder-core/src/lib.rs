//! Branching dataflow histories and the windows used to navigate them.
//!
//! A [`Dataflow`] records every step ever taken, the path currently selected
//! through them, and the lexical names bound to other paths. A [`Layout`]
//! projects a dataflow onto a sparse grid around a focused path.

pub mod dataflow;
pub mod error;
pub mod history;
pub mod layout;
pub mod path;
pub mod reference;

// Re-export commonly used types
pub use dataflow::{Bindings, Dataflow, Dependencies, Step};
pub use error::{CycleError, DataflowError};
pub use history::HistoryGraph;
pub use layout::{Layout, Node, PathOrder};
pub use path::Path;
pub use reference::{ReferenceGraph, Vertex};
