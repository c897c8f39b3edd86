#![forbid(unsafe_code)]

//! Identifiers, edge directions and the crate-wide error type.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Dense vertex identifier in `[0, vertex_count)`.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
#[repr(transparent)]
pub struct VertexId(pub u32);

impl VertexId {
    /// Returns the identifier as a slot index.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl From<u32> for VertexId {
    fn from(value: u32) -> Self {
        VertexId(value)
    }
}

impl From<VertexId> for u32 {
    fn from(value: VertexId) -> Self {
        value.0
    }
}

/// Which adjacency list of a vertex an operation refers to.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub enum EdgeDir {
    /// Edges pointing at the vertex.
    In,
    /// Edges leaving the vertex.
    Out,
    /// Both lists, in-edges first.
    #[default]
    Both,
}

impl EdgeDir {
    /// Returns the lowercase name used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            EdgeDir::In => "in",
            EdgeDir::Out => "out",
            EdgeDir::Both => "both",
        }
    }
}

/// Errors surfaced by the engine, the graph files and the algorithms.
#[derive(thiserror::Error, Debug)]
pub enum GraphError {
    /// Failure reported by the storage underneath the engine.
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    /// On-disk structure failed validation.
    #[error("corruption: {0}")]
    Corruption(&'static str),
    /// Caller supplied an argument the operation cannot accept.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    /// Configuration could not be loaded or is inconsistent.
    #[error("configuration: {0}")]
    Config(String),
    /// A documented precondition of the API was violated.
    #[error("contract violation: {0}")]
    Contract(&'static str),
    /// A run is already in flight on this engine.
    #[error("engine busy: a run is already in progress")]
    Busy,
    /// The run was stopped through its cancellation token.
    #[error("run cancelled")]
    Cancelled,
    /// A vertex callback panicked; the whole run is abandoned.
    #[error("vertex callback fault: {0}")]
    VertexFault(String),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_id_orders_numerically() {
        let mut ids = vec![VertexId(7), VertexId(2), VertexId(11)];
        ids.sort();
        assert_eq!(ids, vec![VertexId(2), VertexId(7), VertexId(11)]);
        assert_eq!(VertexId(11).index(), 11);
        assert_eq!(VertexId(3).to_string(), "v3");
    }

    #[test]
    fn io_errors_convert() {
        let err: GraphError =
            std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read").into();
        assert!(matches!(err, GraphError::Io(_)));
    }
}
