//! Out-of-core, vertex-centric graph processing.
//!
//! Graphs live on disk as page-striped adjacency files plus a compact vertex
//! index. A [`GraphEngine`] runs a user [`ComputeVertex`] program over every
//! vertex in supersteps; vertices ask for edge lists, which are served from a
//! shared page cache through deferred callbacks, and talk to each other with
//! messages delivered at superstep barriers.

#![warn(missing_docs)]

pub mod algs;
pub mod cli;
pub mod engine;
pub mod graph;
pub mod logging;
pub mod primitives;
pub mod types;

pub use engine::{
    CancellationToken, ComputeVertex, EngineConfig, GraphEngine, RunSummary, Seed, VertexContext,
};
pub use graph::{GraphBuilder, GraphIndex, PageVertex, VertexMeta};
pub use types::{EdgeDir, GraphError, Result, VertexId};
