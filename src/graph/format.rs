//! On-disk layout of the adjacency files and the vertex index file.
//!
//! All integers are little endian. The adjacency space is a sequence of pages
//! striped over the partition files; logical page 0 holds the [`GraphHeader`]
//! and vertex data starts at logical page [`DATA_START_PAGE`]. Each vertex owns
//! a contiguous run of `u32` ids: its sorted in-edges followed by its sorted
//! out-edges. Runs may cross page boundaries.

use std::ops::Range;

use crate::types::{GraphError, Result};

/// First logical page holding vertex data.
pub const DATA_START_PAGE: u64 = 1;
/// Bytes per stored edge id.
pub const EDGE_ID_LEN: u64 = 4;
/// Default page size for new graphs.
pub const DEFAULT_PAGE_SIZE: u32 = 4096;
/// Smallest page size accepted anywhere.
pub const MIN_PAGE_SIZE: u32 = 512;

pub const GRAPH_MAGIC: [u8; 4] = *b"PGRF";
pub const INDEX_MAGIC: [u8; 4] = *b"PGIX";
pub const FORMAT_VERSION: u16 = 1;

pub const GRAPH_HDR_LEN: usize = 44;
pub const INDEX_HDR_LEN: usize = 32;
pub const INDEX_ENTRY_LEN: usize = 16;

pub mod graph_header {
    //! Byte offsets for [`super::GraphHeader`] fields.
    use std::ops::Range;

    pub const MAGIC: Range<usize> = 0..4;
    pub const FORMAT_VERSION: Range<usize> = 4..6;
    pub const RESERVED: Range<usize> = 6..8;
    pub const PAGE_SIZE: Range<usize> = 8..12;
    pub const FILE_COUNT: Range<usize> = 12..16;
    pub const STRIPE_PAGES: Range<usize> = 16..20;
    pub const VERTEX_COUNT: Range<usize> = 20..24;
    pub const EDGE_COUNT: Range<usize> = 24..32;
    pub const DATA_PAGES: Range<usize> = 32..40;
    pub const CRC32: Range<usize> = 40..44;
}

pub mod index_header {
    //! Byte offsets for [`super::IndexHeader`] fields.
    use std::ops::Range;

    pub const MAGIC: Range<usize> = 0..4;
    pub const FORMAT_VERSION: Range<usize> = 4..6;
    pub const RESERVED: Range<usize> = 6..8;
    pub const VERTEX_COUNT: Range<usize> = 8..12;
    pub const PAD: Range<usize> = 12..16;
    pub const EDGE_COUNT: Range<usize> = 16..24;
    pub const ENTRIES_CRC32: Range<usize> = 24..28;
    pub const CRC32: Range<usize> = 28..32;
}

pub mod index_entry {
    //! Byte offsets for [`super::IndexEntry`] fields.
    use std::ops::Range;

    pub const OFFSET: Range<usize> = 0..8;
    pub const IN_DEGREE: Range<usize> = 8..12;
    pub const OUT_DEGREE: Range<usize> = 12..16;
}

pub(crate) fn get_u16(buf: &[u8], at: Range<usize>) -> u16 {
    let mut raw = [0u8; 2];
    raw.copy_from_slice(&buf[at]);
    u16::from_le_bytes(raw)
}

pub(crate) fn get_u32(buf: &[u8], at: Range<usize>) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[at]);
    u32::from_le_bytes(raw)
}

pub(crate) fn get_u64(buf: &[u8], at: Range<usize>) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[at]);
    u64::from_le_bytes(raw)
}

/// Header stored at the start of logical page 0.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GraphHeader {
    pub page_size: u32,
    pub file_count: u32,
    pub stripe_pages: u32,
    pub vertex_count: u32,
    /// Directed edge count, i.e. the sum of all out-degrees.
    pub edge_count: u64,
    /// Pages of vertex data following the header page.
    pub data_pages: u64,
}

impl GraphHeader {
    pub fn encode(&self, dst: &mut [u8]) -> Result<()> {
        if dst.len() < GRAPH_HDR_LEN {
            return Err(GraphError::Invalid("graph header buffer too small"));
        }
        let hdr = &mut dst[..GRAPH_HDR_LEN];
        hdr[graph_header::MAGIC].copy_from_slice(&GRAPH_MAGIC);
        hdr[graph_header::FORMAT_VERSION].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        hdr[graph_header::RESERVED].fill(0);
        hdr[graph_header::PAGE_SIZE].copy_from_slice(&self.page_size.to_le_bytes());
        hdr[graph_header::FILE_COUNT].copy_from_slice(&self.file_count.to_le_bytes());
        hdr[graph_header::STRIPE_PAGES].copy_from_slice(&self.stripe_pages.to_le_bytes());
        hdr[graph_header::VERTEX_COUNT].copy_from_slice(&self.vertex_count.to_le_bytes());
        hdr[graph_header::EDGE_COUNT].copy_from_slice(&self.edge_count.to_le_bytes());
        hdr[graph_header::DATA_PAGES].copy_from_slice(&self.data_pages.to_le_bytes());
        let crc = crc32fast::hash(&hdr[..graph_header::CRC32.start]);
        hdr[graph_header::CRC32].copy_from_slice(&crc.to_le_bytes());
        Ok(())
    }

    pub fn decode(src: &[u8]) -> Result<Self> {
        if src.len() < GRAPH_HDR_LEN {
            return Err(GraphError::Corruption("graph header truncated"));
        }
        let hdr = &src[..GRAPH_HDR_LEN];
        if hdr[graph_header::MAGIC] != GRAPH_MAGIC {
            return Err(GraphError::Corruption("invalid graph magic"));
        }
        if get_u16(hdr, graph_header::FORMAT_VERSION) != FORMAT_VERSION {
            return Err(GraphError::Corruption("unsupported graph format version"));
        }
        if get_u32(hdr, graph_header::CRC32) != crc32fast::hash(&hdr[..graph_header::CRC32.start])
        {
            return Err(GraphError::Corruption("graph header checksum mismatch"));
        }
        let header = Self {
            page_size: get_u32(hdr, graph_header::PAGE_SIZE),
            file_count: get_u32(hdr, graph_header::FILE_COUNT),
            stripe_pages: get_u32(hdr, graph_header::STRIPE_PAGES),
            vertex_count: get_u32(hdr, graph_header::VERTEX_COUNT),
            edge_count: get_u64(hdr, graph_header::EDGE_COUNT),
            data_pages: get_u64(hdr, graph_header::DATA_PAGES),
        };
        if header.page_size < MIN_PAGE_SIZE || !header.page_size.is_power_of_two() {
            return Err(GraphError::Corruption("graph page size invalid"));
        }
        if header.file_count == 0 || header.stripe_pages == 0 {
            return Err(GraphError::Corruption("graph partition geometry invalid"));
        }
        Ok(header)
    }
}

/// Header of the vertex index file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IndexHeader {
    pub vertex_count: u32,
    pub edge_count: u64,
    /// CRC32 over every encoded entry.
    pub entries_crc32: u32,
}

impl IndexHeader {
    pub fn encode(&self, dst: &mut [u8]) -> Result<()> {
        if dst.len() < INDEX_HDR_LEN {
            return Err(GraphError::Invalid("index header buffer too small"));
        }
        let hdr = &mut dst[..INDEX_HDR_LEN];
        hdr[index_header::MAGIC].copy_from_slice(&INDEX_MAGIC);
        hdr[index_header::FORMAT_VERSION].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        hdr[index_header::RESERVED].fill(0);
        hdr[index_header::VERTEX_COUNT].copy_from_slice(&self.vertex_count.to_le_bytes());
        hdr[index_header::PAD].fill(0);
        hdr[index_header::EDGE_COUNT].copy_from_slice(&self.edge_count.to_le_bytes());
        hdr[index_header::ENTRIES_CRC32].copy_from_slice(&self.entries_crc32.to_le_bytes());
        let crc = crc32fast::hash(&hdr[..index_header::CRC32.start]);
        hdr[index_header::CRC32].copy_from_slice(&crc.to_le_bytes());
        Ok(())
    }

    pub fn decode(src: &[u8]) -> Result<Self> {
        if src.len() < INDEX_HDR_LEN {
            return Err(GraphError::Corruption("index header truncated"));
        }
        let hdr = &src[..INDEX_HDR_LEN];
        if hdr[index_header::MAGIC] != INDEX_MAGIC {
            return Err(GraphError::Corruption("invalid index magic"));
        }
        if get_u16(hdr, index_header::FORMAT_VERSION) != FORMAT_VERSION {
            return Err(GraphError::Corruption("unsupported index format version"));
        }
        if get_u32(hdr, index_header::CRC32) != crc32fast::hash(&hdr[..index_header::CRC32.start])
        {
            return Err(GraphError::Corruption("index header checksum mismatch"));
        }
        Ok(Self {
            vertex_count: get_u32(hdr, index_header::VERTEX_COUNT),
            edge_count: get_u64(hdr, index_header::EDGE_COUNT),
            entries_crc32: get_u32(hdr, index_header::ENTRIES_CRC32),
        })
    }
}

/// Location and degrees of one vertex.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct IndexEntry {
    /// Byte offset of the vertex run, relative to the first data page.
    pub offset: u64,
    pub in_degree: u32,
    pub out_degree: u32,
}

impl IndexEntry {
    pub fn encode(&self, dst: &mut [u8]) {
        dst[index_entry::OFFSET].copy_from_slice(&self.offset.to_le_bytes());
        dst[index_entry::IN_DEGREE].copy_from_slice(&self.in_degree.to_le_bytes());
        dst[index_entry::OUT_DEGREE].copy_from_slice(&self.out_degree.to_le_bytes());
    }

    pub fn decode(src: &[u8]) -> Self {
        Self {
            offset: get_u64(src, index_entry::OFFSET),
            in_degree: get_u32(src, index_entry::IN_DEGREE),
            out_degree: get_u32(src, index_entry::OUT_DEGREE),
        }
    }

    /// Bytes occupied by the vertex run.
    pub fn run_len(&self) -> u64 {
        (self.in_degree as u64 + self.out_degree as u64) * EDGE_ID_LEN
    }
}
