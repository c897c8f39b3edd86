use std::{fs, path::Path};

use tracing::info;

use crate::graph::format::{
    GraphHeader, IndexEntry, DATA_START_PAGE, DEFAULT_PAGE_SIZE, EDGE_ID_LEN, MIN_PAGE_SIZE,
};
use crate::graph::index::GraphIndex;
use crate::primitives::partition::PartitionedFile;
use crate::types::{GraphError, Result};

/// What a finished build wrote.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub vertices: u32,
    pub edges: u64,
    pub data_pages: u64,
    pub files: usize,
    pub self_loops_dropped: u64,
    pub duplicates_dropped: u64,
}

/// Collects an edge list and writes the adjacency and index files.
///
/// Edge lists come out sorted ascending with self-loops and parallel edges
/// removed. In undirected mode every edge is stored in both directions.
pub struct GraphBuilder {
    edges: Vec<(u32, u32)>,
    vertex_count: Option<u32>,
    undirected: bool,
    page_size: u32,
    stripe_pages: u32,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            edges: Vec::new(),
            vertex_count: None,
            undirected: false,
            page_size: DEFAULT_PAGE_SIZE,
            stripe_pages: 16,
        }
    }

    /// Fixes the vertex count; ids never mentioned by an edge become isolated vertices.
    pub fn vertex_count(mut self, count: u32) -> Self {
        self.vertex_count = Some(count);
        self
    }

    pub fn undirected(mut self, yes: bool) -> Self {
        self.undirected = yes;
        self
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn stripe_pages(mut self, pages: u32) -> Self {
        self.stripe_pages = pages;
        self
    }

    pub fn add_edge(&mut self, src: u32, dst: u32) {
        self.edges.push((src, dst));
    }

    pub fn extend_edges<I: IntoIterator<Item = (u32, u32)>>(&mut self, edges: I) {
        self.edges.extend(edges);
    }

    /// Number of edges added so far, before cleanup.
    pub fn pending_edges(&self) -> usize {
        self.edges.len()
    }

    /// Writes the adjacency data striped over `graph_paths` and the index to `index_path`.
    pub fn finish<P: AsRef<Path>>(
        self,
        graph_paths: &[P],
        index_path: impl AsRef<Path>,
    ) -> Result<BuildSummary> {
        if self.page_size < MIN_PAGE_SIZE || !self.page_size.is_power_of_two() {
            return Err(GraphError::Invalid("page size must be a power of two >= 512"));
        }
        let file_count = u32::try_from(graph_paths.len())
            .map_err(|_| GraphError::Invalid("too many graph files"))?;
        let max_id = self
            .edges
            .iter()
            .map(|&(s, d)| s.max(d) as u64 + 1)
            .max()
            .unwrap_or(0);
        let vertex_count = match self.vertex_count {
            Some(n) if (n as u64) < max_id => {
                return Err(GraphError::Invalid("edge endpoint beyond the declared vertex count"))
            }
            Some(n) => n,
            None => u32::try_from(max_id)
                .map_err(|_| GraphError::Invalid("vertex id space exceeds u32"))?,
        };

        let raw = self.edges.len() as u64;
        let mut out_edges = self.edges;
        let before_loops = out_edges.len() as u64;
        out_edges.retain(|&(s, d)| s != d);
        let self_loops_dropped = before_loops - out_edges.len() as u64;
        if self.undirected {
            let mirrored: Vec<_> = out_edges.iter().map(|&(s, d)| (d, s)).collect();
            out_edges.extend(mirrored);
        }
        out_edges.sort_unstable();
        out_edges.dedup();
        let duplicates_dropped = if self.undirected {
            (raw - self_loops_dropped) * 2 - out_edges.len() as u64
        } else {
            raw - self_loops_dropped - out_edges.len() as u64
        };
        let mut in_edges: Vec<(u32, u32)> = out_edges.iter().map(|&(s, d)| (d, s)).collect();
        in_edges.sort_unstable();

        let view = PartitionedFile::create(
            graph_paths,
            self.page_size as usize,
            self.stripe_pages as u64,
        )?;
        let mut writer = PageWriter::new(&view, DATA_START_PAGE);
        let mut entries = Vec::with_capacity(vertex_count as usize);
        let (mut in_pos, mut out_pos) = (0usize, 0usize);
        for v in 0..vertex_count {
            let offset = writer.written();
            let in_start = in_pos;
            while in_pos < in_edges.len() && in_edges[in_pos].0 == v {
                writer.push(in_edges[in_pos].1)?;
                in_pos += 1;
            }
            let out_start = out_pos;
            while out_pos < out_edges.len() && out_edges[out_pos].0 == v {
                writer.push(out_edges[out_pos].1)?;
                out_pos += 1;
            }
            entries.push(IndexEntry {
                offset,
                in_degree: (in_pos - in_start) as u32,
                out_degree: (out_pos - out_start) as u32,
            });
        }
        let data_pages = writer.finish()?;

        let header = GraphHeader {
            page_size: self.page_size,
            file_count,
            stripe_pages: self.stripe_pages,
            vertex_count,
            edge_count: out_edges.len() as u64,
            data_pages,
        };
        let mut page = vec![0u8; self.page_size as usize];
        header.encode(&mut page)?;
        view.write_page(0, &page)?;
        view.sync_all()?;

        fs::write(index_path.as_ref(), GraphIndex::encode(&entries)?)?;

        let summary = BuildSummary {
            vertices: vertex_count,
            edges: out_edges.len() as u64,
            data_pages,
            files: graph_paths.len(),
            self_loops_dropped,
            duplicates_dropped,
        };
        info!(
            vertices = summary.vertices,
            edges = summary.edges,
            data_pages = summary.data_pages,
            files = summary.files,
            "graph.build.done"
        );
        Ok(summary)
    }
}

/// Streams `u32` ids into consecutive logical pages.
struct PageWriter<'a> {
    view: &'a PartitionedFile,
    page: Vec<u8>,
    fill: usize,
    next_page: u64,
    first_page: u64,
}

impl<'a> PageWriter<'a> {
    fn new(view: &'a PartitionedFile, first_page: u64) -> Self {
        Self {
            view,
            page: vec![0u8; view.page_size()],
            fill: 0,
            next_page: first_page,
            first_page,
        }
    }

    fn written(&self) -> u64 {
        (self.next_page - self.first_page) * self.page.len() as u64 + self.fill as u64
    }

    fn push(&mut self, id: u32) -> Result<()> {
        self.page[self.fill..self.fill + EDGE_ID_LEN as usize].copy_from_slice(&id.to_le_bytes());
        self.fill += EDGE_ID_LEN as usize;
        if self.fill == self.page.len() {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.page[self.fill..].fill(0);
        self.view.write_page(self.next_page, &self.page)?;
        self.next_page += 1;
        self.fill = 0;
        Ok(())
    }

    /// Pads and writes the last partial page; returns the number of data pages.
    fn finish(mut self) -> Result<u64> {
        if self.fill > 0 {
            self.flush()?;
        }
        Ok(self.next_page - self.first_page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EdgeDir, VertexId};
    use tempfile::tempdir;

    #[test]
    fn undirected_build_mirrors_and_cleans() {
        let dir = tempdir().unwrap();
        let graph = [dir.path().join("g.0"), dir.path().join("g.1")];
        let index_path = dir.path().join("g.idx");
        let mut builder = GraphBuilder::new().undirected(true).page_size(512).stripe_pages(1);
        builder.extend_edges([(0, 1), (1, 0), (1, 2), (2, 2)]);
        let summary = builder.vertex_count(4).finish(&graph, &index_path).unwrap();
        assert_eq!(summary.vertices, 4);
        assert_eq!(summary.edges, 4);
        assert_eq!(summary.self_loops_dropped, 1);
        assert_eq!(summary.duplicates_dropped, 2);

        let index = GraphIndex::open(&index_path).unwrap();
        assert_eq!(index.degree(VertexId(1), EdgeDir::Out), 2);
        assert_eq!(index.degree(VertexId(1), EdgeDir::In), 2);
        assert_eq!(index.num_edges(VertexId(3)), 0);
    }

    #[test]
    fn declared_count_must_cover_edges() {
        let dir = tempdir().unwrap();
        let mut builder = GraphBuilder::new().vertex_count(2);
        builder.add_edge(0, 5);
        let err = builder
            .finish(&[dir.path().join("g.0")], dir.path().join("g.idx"))
            .err()
            .unwrap();
        assert!(matches!(err, GraphError::Invalid(_)));
    }

    #[test]
    fn runs_cross_page_boundaries() {
        let dir = tempdir().unwrap();
        let mut builder = GraphBuilder::new().page_size(512);
        builder.extend_edges((1..300).map(|d| (0, d)));
        let summary = builder
            .finish(&[dir.path().join("g.0")], dir.path().join("g.idx"))
            .unwrap();
        assert_eq!(summary.edges, 299);
        assert_eq!(summary.data_pages, 5);
    }
}
