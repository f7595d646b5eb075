pub mod heap_file;

/// Bytes per page, including the presence-bitmap header.
pub const PAGE_SIZE: usize = 4096;

pub use heap_file::HeapFile;
