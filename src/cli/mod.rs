//! Support code for the `pagegraph` binary.

/// Edge-list import into graph and index files.
pub mod import;
