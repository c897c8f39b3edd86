use std::{fs, path::Path, sync::Arc};

use tracing::debug;

use crate::graph::format::{
    IndexEntry, IndexHeader, DATA_START_PAGE, EDGE_ID_LEN, INDEX_ENTRY_LEN, INDEX_HDR_LEN,
};
use crate::types::{EdgeDir, GraphError, Result, VertexId};

/// Immutable per-vertex metadata, available without I/O.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct VertexMeta {
    pub in_degree: u32,
    pub out_degree: u32,
    /// Byte offset of the vertex run within the adjacency data.
    pub offset: u64,
}

impl VertexMeta {
    /// Number of edges in the given direction.
    pub fn degree(&self, dir: EdgeDir) -> u32 {
        match dir {
            EdgeDir::In => self.in_degree,
            EdgeDir::Out => self.out_degree,
            EdgeDir::Both => self.in_degree + self.out_degree,
        }
    }

    /// In-degree plus out-degree.
    pub fn num_edges(&self) -> u32 {
        self.in_degree + self.out_degree
    }
}

/// In-memory vertex index: one [`VertexMeta`] per vertex.
pub struct GraphIndex {
    entries: Box<[VertexMeta]>,
    edge_count: u64,
}

impl GraphIndex {
    /// Loads and validates an index file.
    pub fn open(path: impl AsRef<Path>) -> Result<Arc<Self>> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        let index = Self::decode(&bytes)?;
        debug!(
            path = %path.display(),
            vertices = index.vertex_count(),
            edges = index.edge_count,
            "graph.index.opened"
        );
        Ok(Arc::new(index))
    }

    /// Decodes an index image held in memory.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = IndexHeader::decode(bytes)?;
        let body = &bytes[INDEX_HDR_LEN..];
        let expected = header.vertex_count as usize * INDEX_ENTRY_LEN;
        if body.len() != expected {
            return Err(GraphError::Corruption("index length does not match vertex count"));
        }
        if crc32fast::hash(body) != header.entries_crc32 {
            return Err(GraphError::Corruption("index entries checksum mismatch"));
        }
        let mut entries = Vec::with_capacity(header.vertex_count as usize);
        let mut next_offset = 0u64;
        let mut out_total = 0u64;
        for raw in body.chunks_exact(INDEX_ENTRY_LEN) {
            let entry = IndexEntry::decode(raw);
            if entry.offset != next_offset {
                return Err(GraphError::Corruption("index offsets are not contiguous"));
            }
            next_offset += entry.run_len();
            out_total += entry.out_degree as u64;
            entries.push(VertexMeta {
                in_degree: entry.in_degree,
                out_degree: entry.out_degree,
                offset: entry.offset,
            });
        }
        if out_total != header.edge_count {
            return Err(GraphError::Corruption("index edge count mismatch"));
        }
        Ok(Self {
            entries: entries.into_boxed_slice(),
            edge_count: header.edge_count,
        })
    }

    /// Encodes the entries as an index file image.
    pub fn encode(entries: &[IndexEntry]) -> Result<Vec<u8>> {
        let vertex_count = u32::try_from(entries.len())
            .map_err(|_| GraphError::Invalid("too many vertices for a u32 id"))?;
        let mut out = vec![0u8; INDEX_HDR_LEN + entries.len() * INDEX_ENTRY_LEN];
        for (entry, slot) in entries
            .iter()
            .zip(out[INDEX_HDR_LEN..].chunks_exact_mut(INDEX_ENTRY_LEN))
        {
            entry.encode(slot);
        }
        let header = IndexHeader {
            vertex_count,
            edge_count: entries.iter().map(|e| e.out_degree as u64).sum(),
            entries_crc32: crc32fast::hash(&out[INDEX_HDR_LEN..]),
        };
        header.encode(&mut out[..INDEX_HDR_LEN])?;
        Ok(out)
    }

    /// Number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.entries.len()
    }

    /// Number of directed edges.
    pub fn edge_count(&self) -> u64 {
        self.edge_count
    }

    /// Metadata of `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a vertex of this graph.
    #[inline]
    pub fn meta(&self, id: VertexId) -> VertexMeta {
        match self.entries.get(id.index()) {
            Some(meta) => *meta,
            None => panic!(
                "vertex {id} out of range (graph has {} vertices)",
                self.entries.len()
            ),
        }
    }

    /// Degree of `id` in the given direction.
    pub fn degree(&self, id: VertexId, dir: EdgeDir) -> u32 {
        self.meta(id).degree(dir)
    }

    /// In-degree plus out-degree of `id`.
    pub fn num_edges(&self, id: VertexId) -> u32 {
        self.meta(id).num_edges()
    }

    /// Absolute logical byte range holding the `dir` edges of `id`.
    pub fn location(&self, id: VertexId, dir: EdgeDir, page_size: usize) -> (u64, u64) {
        let meta = self.meta(id);
        let base = DATA_START_PAGE * page_size as u64 + meta.offset;
        let in_len = meta.in_degree as u64 * EDGE_ID_LEN;
        let out_len = meta.out_degree as u64 * EDGE_ID_LEN;
        match dir {
            EdgeDir::In => (base, in_len),
            EdgeDir::Out => (base + in_len, out_len),
            EdgeDir::Both => (base, in_len + out_len),
        }
    }

    /// Total bytes of vertex data.
    pub fn data_len(&self) -> u64 {
        self.entries
            .last()
            .map(|m| m.offset + m.num_edges() as u64 * EDGE_ID_LEN)
            .unwrap_or(0)
    }

    /// Iterates over every vertex id.
    pub fn vertices(&self) -> impl Iterator<Item = VertexId> + '_ {
        (0..self.entries.len() as u32).map(VertexId)
    }
}
