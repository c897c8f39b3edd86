#![forbid(unsafe_code)]

use std::{path::Path, sync::Arc};

use crate::primitives::io::{FileIo, StdFileIo};
use crate::types::{GraphError, Result};

/// Logical page space striped across one or more backing files.
///
/// Logical page `p` belongs to stripe `p / stripe_pages`; stripes are dealt
/// round-robin over the files, so stripe `s` lives in file `s % n` at
/// physical stripe `s / n`.
pub struct PartitionedFile {
    files: Vec<Arc<dyn FileIo>>,
    page_size: usize,
    stripe_pages: u64,
}

impl PartitionedFile {
    /// Opens every path read-only, in partition order.
    pub fn open<P: AsRef<Path>>(paths: &[P], page_size: usize, stripe_pages: u64) -> Result<Self> {
        let mut files: Vec<Arc<dyn FileIo>> = Vec::with_capacity(paths.len());
        for path in paths {
            files.push(Arc::new(StdFileIo::open_read(path)?));
        }
        Self::from_files(files, page_size, stripe_pages)
    }

    /// Creates (truncating) every path for writing, in partition order.
    pub fn create<P: AsRef<Path>>(
        paths: &[P],
        page_size: usize,
        stripe_pages: u64,
    ) -> Result<Self> {
        let mut files: Vec<Arc<dyn FileIo>> = Vec::with_capacity(paths.len());
        for path in paths {
            files.push(Arc::new(StdFileIo::create(path)?));
        }
        Self::from_files(files, page_size, stripe_pages)
    }

    /// Builds a view over already opened files.
    pub fn from_files(
        files: Vec<Arc<dyn FileIo>>,
        page_size: usize,
        stripe_pages: u64,
    ) -> Result<Self> {
        if files.is_empty() {
            return Err(GraphError::Invalid("partitioned file needs at least one file"));
        }
        if page_size == 0 || !page_size.is_power_of_two() {
            return Err(GraphError::Invalid("page size must be a power of two"));
        }
        if stripe_pages == 0 {
            return Err(GraphError::Invalid("stripe must hold at least one page"));
        }
        Ok(Self {
            files,
            page_size,
            stripe_pages,
        })
    }

    /// Size of one page in bytes.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of backing files.
    pub fn num_files(&self) -> usize {
        self.files.len()
    }

    /// Pages per stripe.
    pub fn stripe_pages(&self) -> u64 {
        self.stripe_pages
    }

    /// Returns `(file index, byte offset within that file)` for a logical page.
    pub fn locate(&self, page: u64) -> (usize, u64) {
        let n = self.files.len() as u64;
        let stripe = page / self.stripe_pages;
        let file = (stripe % n) as usize;
        let physical = (stripe / n) * self.stripe_pages + page % self.stripe_pages;
        (file, physical * self.page_size as u64)
    }

    /// Reads one whole logical page into `dst`.
    pub fn read_page(&self, page: u64, dst: &mut [u8]) -> Result<()> {
        if dst.len() != self.page_size {
            return Err(GraphError::Invalid("page buffer has the wrong size"));
        }
        let (file, off) = self.locate(page);
        self.files[file].read_at(off, dst)
    }

    /// Writes one whole logical page.
    pub fn write_page(&self, page: u64, src: &[u8]) -> Result<()> {
        if src.len() != self.page_size {
            return Err(GraphError::Invalid("page buffer has the wrong size"));
        }
        let (file, off) = self.locate(page);
        self.files[file].write_at(off, src)
    }

    /// Number of logical pages that are fully backed by the files.
    ///
    /// Pages are counted in logical order and the count stops at the first
    /// page whose backing bytes are missing.
    pub fn total_pages(&self) -> Result<u64> {
        let mut lens = Vec::with_capacity(self.files.len());
        for file in &self.files {
            lens.push(file.len()? / self.page_size as u64);
        }
        let mut page = 0u64;
        loop {
            let (file, off) = self.locate(page);
            if off / self.page_size as u64 >= lens[file] {
                return Ok(page);
            }
            page += 1;
        }
    }

    /// Flushes every backing file.
    pub fn sync_all(&self) -> Result<()> {
        for file in &self.files {
            file.sync_all()?;
        }
        Ok(())
    }
}
