#![forbid(unsafe_code)]

//! Sharded LRU cache of read-only pages over a [`PartitionedFile`].
//!
//! Pages are handed out as reference-counted byte slices. An evicted page stays
//! alive for as long as some reader still holds it; the next lookup simply
//! faults it in again.

use std::{
    num::NonZeroUsize,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;

use crate::primitives::partition::PartitionedFile;
use crate::types::Result;

/// Shared handle to a resident page.
pub type PageRef = Arc<[u8]>;

const MAX_SHARDS: usize = 16;

/// Snapshot of page cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups served from memory.
    pub hits: u64,
    /// Lookups that had to read the page.
    pub misses: u64,
    /// Pages pushed out to make room.
    pub evictions: u64,
    /// Bytes read from the backing files.
    pub bytes_read: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    bytes_read: AtomicU64,
}

/// Page cache shared by all engine workers.
pub struct PageCache {
    file: PartitionedFile,
    shards: Box<[Mutex<LruCache<u64, PageRef>>]>,
    counters: Counters,
}

impl PageCache {
    /// Creates a cache holding at most `capacity_pages` pages (at least one per shard).
    pub fn new(file: PartitionedFile, capacity_pages: usize) -> Self {
        let shard_count = capacity_pages.clamp(1, MAX_SHARDS);
        let per_shard = NonZeroUsize::new((capacity_pages / shard_count).max(1))
            .unwrap_or(NonZeroUsize::MIN);
        let shards = (0..shard_count)
            .map(|_| Mutex::new(LruCache::new(per_shard)))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            file,
            shards,
            counters: Counters::default(),
        }
    }

    /// The file view pages are read from.
    pub fn file(&self) -> &PartitionedFile {
        &self.file
    }

    /// Page size of the underlying view.
    pub fn page_size(&self) -> usize {
        self.file.page_size()
    }

    fn shard(&self, page: u64) -> &Mutex<LruCache<u64, PageRef>> {
        &self.shards[(page % self.shards.len() as u64) as usize]
    }

    /// Returns the page, reading it from disk if it is not resident.
    ///
    /// The read happens outside the shard lock. Two threads faulting the same
    /// page concurrently both read it and the first insert wins.
    pub fn get(&self, page: u64) -> Result<PageRef> {
        if let Some(hit) = self.shard(page).lock().get(&page) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(hit));
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        let mut buf = vec![0u8; self.file.page_size()];
        self.file.read_page(page, &mut buf)?;
        self.counters
            .bytes_read
            .fetch_add(buf.len() as u64, Ordering::Relaxed);
        let loaded: PageRef = buf.into();

        let mut shard = self.shard(page).lock();
        if let Some(existing) = shard.get(&page) {
            return Ok(Arc::clone(existing));
        }
        if shard.push(page, Arc::clone(&loaded)).is_some() {
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
        }
        Ok(loaded)
    }

    /// Copies `dst.len()` bytes starting at logical byte `off`, crossing pages as needed.
    pub fn read_range(&self, off: u64, dst: &mut [u8]) -> Result<()> {
        let page_size = self.file.page_size() as u64;
        let mut pos = off;
        let mut filled = 0usize;
        while filled < dst.len() {
            let page = self.get(pos / page_size)?;
            let in_page = (pos % page_size) as usize;
            let take = (page.len() - in_page).min(dst.len() - filled);
            dst[filled..filled + take].copy_from_slice(&page[in_page..in_page + take]);
            filled += take;
            pos += take as u64;
        }
        Ok(())
    }

    /// Faults in every page in `pages`, returning how many were read from disk.
    pub fn preload(&self, pages: std::ops::Range<u64>) -> Result<u64> {
        let before = self.counters.misses.load(Ordering::Relaxed);
        for page in pages {
            self.get(page)?;
        }
        Ok(self.counters.misses.load(Ordering::Relaxed) - before)
    }

    /// Number of pages currently resident.
    pub fn resident(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    /// Current counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            bytes_read: self.counters.bytes_read.load(Ordering::Relaxed),
        }
    }
}
