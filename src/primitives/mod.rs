//! Storage collaborators underneath the engine.
//!
//! Includes positional file I/O, the partitioned file view that maps logical
//! pages onto several backing files, and the shared page cache.

/// I/O abstractions and utilities.
///
/// Interfaces for positional reads and writes against backing files.
pub mod io;

/// Logical page to physical file mapping.
pub mod partition;

/// Shared, evictable page cache.
pub mod pager;
