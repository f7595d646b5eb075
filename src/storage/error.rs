//! Storage layer error types.

use crate::storage::page::TableId;
use crate::transaction::TransactionId;
use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("transaction {0} was aborted as a deadlock victim")]
    TransactionAborted(TransactionId),

    #[error("page {page_no} out of range for table {table_id:?} (page count: {page_count})")]
    PageOutOfRange {
        table_id: TableId,
        page_no: u32,
        page_count: u32,
    },

    #[error("slot {slot} out of range (page has {num_slots} slots)")]
    SlotOutOfRange { slot: u16, num_slots: u16 },

    #[error("integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("buffer pool exhausted: every resident page is dirty")]
    CacheExhausted,

    #[error("unknown table: {0:?}")]
    UnknownTable(TableId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
