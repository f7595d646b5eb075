//! Storage layer implementation for heapdb.
//!
//! This module mediates every access to on-disk relation pages:
//!
//! - **HeapPage**: fixed-size slotted page with a presence bitmap and
//!   fixed-width tuple slots, the basic unit of I/O
//! - **HeapFile**: pages concatenated into a single relation file,
//!   read and written whole
//! - **BufferPool**: bounded in-memory page cache that gates all page
//!   access through per-transaction page locks and handles commit/abort
//!
//! There is no write-ahead log: commit writes dirtied pages in place and
//! abort re-reads them from disk, so the buffer pool must never evict a
//! dirty page without writing it through first.

pub mod buffer;
pub mod disk;
pub mod error;
pub mod page;

pub use buffer::BufferPool;
pub use disk::{HeapFile, PAGE_SIZE};
pub use error::{StorageError, StorageResult};
pub use page::{HeapPage, PageId, TableId};
