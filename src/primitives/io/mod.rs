#![forbid(unsafe_code)]

use std::{
    fs::{File, OpenOptions},
    io::{self, ErrorKind},
    path::Path,
    sync::Arc,
};

use crate::types::{GraphError, Result};

#[cfg(test)]
macro_rules! io_test_log {
    ($($arg:tt)*) => {
        eprintln!($($arg)*);
    };
}

#[cfg(not(test))]
macro_rules! io_test_log {
    ($($arg:tt)*) => {
        if false {
            let _ = format_args!($($arg)*);
        }
    };
}

/// Positional file access used by the partitioned file view.
///
/// Implementations must be safe to call from many worker threads at once;
/// no call may depend on a shared seek position.
pub trait FileIo: Send + Sync + 'static {
    /// Fills `dst` with the bytes starting at `off`. Short reads are errors.
    fn read_at(&self, off: u64, dst: &mut [u8]) -> Result<()>;
    /// Writes all of `src` starting at `off`.
    fn write_at(&self, off: u64, src: &[u8]) -> Result<()>;
    /// Flushes data and metadata to the device.
    fn sync_all(&self) -> Result<()>;
    /// Current length in bytes.
    fn len(&self) -> Result<u64>;
    /// Returns true if the file holds no bytes.
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[cfg(unix)]
mod positional {
    use std::{fs::File, io, os::unix::fs::FileExt};

    pub fn read_some(file: &File, dst: &mut [u8], off: u64) -> io::Result<usize> {
        file.read_at(dst, off)
    }

    pub fn write_some(file: &File, src: &[u8], off: u64) -> io::Result<usize> {
        file.write_at(src, off)
    }
}

#[cfg(windows)]
mod positional {
    use std::{fs::File, io, os::windows::fs::FileExt};

    pub fn read_some(file: &File, dst: &mut [u8], off: u64) -> io::Result<usize> {
        file.seek_read(dst, off)
    }

    pub fn write_some(file: &File, src: &[u8], off: u64) -> io::Result<usize> {
        file.seek_write(src, off)
    }
}

#[cfg(not(any(unix, windows)))]
mod positional {
    use std::{fs::File, io};

    pub fn read_some(_file: &File, _dst: &mut [u8], _off: u64) -> io::Result<usize> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "positional reads unsupported on this platform",
        ))
    }

    pub fn write_some(_file: &File, _src: &[u8], _off: u64) -> io::Result<usize> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "positional writes unsupported on this platform",
        ))
    }
}

fn read_exact_at(file: &File, mut off: u64, mut dst: &mut [u8]) -> io::Result<()> {
    io_test_log!("[io.read_exact] start off={} len={}", off, dst.len());
    while !dst.is_empty() {
        match positional::read_some(file, dst, off) {
            Ok(0) => {
                io_test_log!("[io.read_exact] eof off={} remaining={}", off, dst.len());
                return Err(io::Error::new(
                    ErrorKind::UnexpectedEof,
                    "positional read reached EOF",
                ));
            }
            Ok(read) => {
                let (_, tail) = dst.split_at_mut(read);
                dst = tail;
                off += read as u64;
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

fn write_all_at(file: &File, mut off: u64, mut src: &[u8]) -> io::Result<()> {
    while !src.is_empty() {
        match positional::write_some(file, src, off) {
            Ok(0) => {
                return Err(io::Error::new(
                    ErrorKind::WriteZero,
                    "positional write wrote zero bytes",
                ));
            }
            Ok(written) => {
                src = &src[written..];
                off += written as u64;
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

/// [`FileIo`] over a shared `std::fs::File`.
#[derive(Clone)]
pub struct StdFileIo {
    inner: Arc<File>,
}

impl StdFileIo {
    /// Wraps an already opened file.
    pub fn new(file: File) -> Self {
        Self {
            inner: Arc::new(file),
        }
    }

    /// Opens an existing file for reading only. A missing file is an error.
    pub fn open_read(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .open(path.as_ref())
            .map_err(GraphError::from)?;
        Ok(Self::new(file))
    }

    /// Creates (or truncates) a file for writing graph data.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())
            .map_err(GraphError::from)?;
        Ok(Self::new(file))
    }
}

impl FileIo for StdFileIo {
    fn read_at(&self, off: u64, dst: &mut [u8]) -> Result<()> {
        read_exact_at(&self.inner, off, dst).map_err(GraphError::from)
    }

    fn write_at(&self, off: u64, src: &[u8]) -> Result<()> {
        write_all_at(&self.inner, off, src).map_err(GraphError::from)
    }

    fn sync_all(&self) -> Result<()> {
        io_test_log!("[io.sync_all] start");
        self.inner.sync_all().map_err(GraphError::from)
    }

    fn len(&self) -> Result<u64> {
        Ok(self.inner.metadata().map_err(GraphError::from)?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_then_read_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("adj.bin");
        let io = StdFileIo::create(&path).unwrap();
        io.write_at(4096, b"edges").unwrap();
        io.sync_all().unwrap();

        let reader = StdFileIo::open_read(&path).unwrap();
        let mut buf = [0u8; 5];
        reader.read_at(4096, &mut buf).unwrap();
        assert_eq!(&buf, b"edges");
        assert_eq!(reader.len().unwrap(), 4101);
    }

    #[test]
    fn read_past_eof_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("short.bin");
        let io = StdFileIo::create(&path).unwrap();
        io.write_at(0, &[1, 2, 3]).unwrap();
        let mut buf = [0u8; 8];
        match io.read_at(0, &mut buf).unwrap_err() {
            GraphError::Io(inner) => assert_eq!(inner.kind(), ErrorKind::UnexpectedEof),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn open_missing_file_fails() {
        let dir = tempdir().unwrap();
        let err = StdFileIo::open_read(dir.path().join("absent.bin")).err().unwrap();
        assert!(matches!(err, GraphError::Io(_)));
    }
}
