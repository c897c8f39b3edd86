//! Static graph files: layout, vertex index, writer and edge views.

pub mod builder;
pub mod format;
pub mod index;
pub mod page_vertex;

pub use builder::{BuildSummary, GraphBuilder};
pub use format::GraphHeader;
pub use index::{GraphIndex, VertexMeta};
pub use page_vertex::{count_common, unique_merge, PageVertex};

use std::path::Path;

use crate::primitives::io::{FileIo, StdFileIo};
use crate::types::Result;

/// Reads the header from the first partition file of a graph.
pub fn read_header(first_file: impl AsRef<Path>) -> Result<GraphHeader> {
    let io = StdFileIo::open_read(first_file)?;
    let mut buf = [0u8; format::GRAPH_HDR_LEN];
    io.read_at(0, &mut buf)?;
    GraphHeader::decode(&buf)
}
