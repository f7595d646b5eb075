use crate::access::tuple::Tuple;
use crate::storage::buffer::{BufferPool, Permission};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{PageId, TableId};
use crate::transaction::TransactionId;
use std::sync::Arc;

struct Cursor {
    page_no: u32,
    tuples: Vec<Tuple>,
    index: usize,
}

/// Sequential scan over a relation's pages in page order, slot order within
/// each page.
///
/// Pages are fetched through the buffer pool under shared locks, which are
/// retained until the owning transaction ends; closing or rewinding the scan
/// does not release them.
pub struct SeqScan {
    pool: Arc<BufferPool>,
    tid: TransactionId,
    table_id: TableId,
    cursor: Option<Cursor>,
}

impl SeqScan {
    pub fn new(pool: Arc<BufferPool>, tid: TransactionId, table_id: TableId) -> Self {
        Self {
            pool,
            tid,
            table_id,
            cursor: None,
        }
    }

    /// Positions the scan before the first tuple of the relation.
    pub fn open(&mut self) -> StorageResult<()> {
        self.cursor = Some(Cursor {
            page_no: 0,
            tuples: Vec::new(),
            index: 0,
        });
        Ok(())
    }

    /// Drops the scan position. Subsequent `next` calls fail until the scan
    /// is opened again.
    pub fn close(&mut self) {
        self.cursor = None;
    }

    /// Re-positions an open scan before the first tuple.
    pub fn rewind(&mut self) -> StorageResult<()> {
        if self.cursor.is_none() {
            return Err(StorageError::IntegrityViolation(
                "cannot rewind a scan that is not open".to_string(),
            ));
        }
        self.open()
    }

    /// True if another tuple remains. Loads further pages as needed.
    pub fn has_next(&mut self) -> StorageResult<bool> {
        self.fill()?;
        Ok(self
            .cursor
            .as_ref()
            .is_some_and(|c| c.index < c.tuples.len()))
    }

    /// Returns the next tuple of the scan.
    pub fn next(&mut self) -> StorageResult<Tuple> {
        if !self.has_next()? {
            return Err(StorageError::IntegrityViolation(
                "scan is exhausted or not open".to_string(),
            ));
        }
        let cursor = self.cursor.as_mut().ok_or_else(|| {
            StorageError::IntegrityViolation("scan is not open".to_string())
        })?;
        let tuple = cursor.tuples[cursor.index].clone();
        cursor.index += 1;
        Ok(tuple)
    }

    /// Advances the cursor past empty pages until it buffers a page with
    /// remaining tuples or runs off the end of the file.
    fn fill(&mut self) -> StorageResult<()> {
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(());
        };
        while cursor.index >= cursor.tuples.len() {
            let page_count = self.pool.num_pages(self.table_id)?;
            if cursor.page_no >= page_count {
                return Ok(());
            }
            let pid = PageId::new(self.table_id, cursor.page_no);
            let page = self.pool.fetch(self.tid, pid, Permission::ReadOnly)?;
            cursor.tuples = page.read().iter().cloned().collect();
            cursor.index = 0;
            cursor.page_no += 1;
        }
        Ok(())
    }
}
