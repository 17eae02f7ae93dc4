//! Error types for wayfinder-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering every
//! way a path-algebra operation can be rejected. Steps are rendered with their
//! `Debug` representation so the error type is not generic over the step type.

use std::fmt;

use thiserror::Error;

/// Errors produced by [`Dataflow`](crate::dataflow::Dataflow) operations.
///
/// Every variant is recoverable: the receiver of the failed operation is left
/// untouched and the caller can retry with corrected arguments.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataflowError {
    /// A step reads lexical names which are not currently bound.
    #[error("unsatisfied dependency: {step} reads unbound names {missing:?}")]
    UnsatisfiedDependency { step: String, missing: Vec<String> },

    /// A path is empty, not rooted, or uses an edge missing from the history.
    #[error("invalid path: {reason}")]
    InvalidPath { reason: String },

    /// A reference edge would close a cycle.
    #[error("cyclic dependency: linking {from} -> {to} closes a cycle")]
    CyclicDependency { from: String, to: String },
}

impl DataflowError {
    pub(crate) fn invalid_path(reason: impl Into<String>) -> Self {
        DataflowError::InvalidPath {
            reason: reason.into(),
        }
    }

    pub(crate) fn unsatisfied(step: &impl fmt::Debug, missing: Vec<String>) -> Self {
        DataflowError::UnsatisfiedDependency {
            step: format!("{step:?}"),
            missing,
        }
    }
}

/// Raised by the reference graph when a link would close a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("linking {from} -> {to} closes a cycle")]
pub struct CycleError {
    pub from: String,
    pub to: String,
}

impl From<CycleError> for DataflowError {
    fn from(err: CycleError) -> Self {
        DataflowError::CyclicDependency {
            from: err.from,
            to: err.to,
        }
    }
}
