use crate::storage::buffer::BufferPool;
use crate::transaction::TransactionId;
use std::sync::Arc;

/// A transaction bound to a buffer pool. If the handle is dropped without
/// an explicit `commit`, the transaction is aborted: its locks are released
/// and its in-memory page versions are discarded.
pub struct Transaction {
    id: TransactionId,
    pool: Arc<BufferPool>,
    finished: bool,
}

impl Transaction {
    pub fn begin(pool: Arc<BufferPool>) -> Self {
        let id = pool.next_transaction_id();
        Self {
            id,
            pool,
            finished: false,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Writes every page this transaction dirtied through to disk and
    /// releases its locks.
    pub fn commit(mut self) -> crate::storage::error::StorageResult<()> {
        self.finished = true;
        self.pool.transaction_complete(self.id, true)
    }

    /// Discards this transaction's in-memory writes and releases its locks.
    pub fn abort(mut self) -> crate::storage::error::StorageResult<()> {
        self.finished = true;
        self.pool.transaction_complete(self.id, false)
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.finished {
            // Best-effort abort.
            let _ = self.pool.transaction_complete(self.id, false);
        }
    }
}
