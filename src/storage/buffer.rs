use crate::access::tuple::Tuple;
use crate::concurrency::lock::{LockMode, LockTable};
use crate::storage::disk::HeapFile;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{HeapPage, PageId, TableId};
use crate::transaction::{TransactionId, TransactionIdGenerator};
use dashmap::DashMap;
use log::{debug, trace};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::thread;

/// Access mode requested by a page fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    ReadOnly,
    ReadWrite,
}

impl Permission {
    fn lock_mode(self) -> LockMode {
        match self {
            Permission::ReadOnly => LockMode::Shared,
            Permission::ReadWrite => LockMode::Exclusive,
        }
    }
}

/// The single access point through which every page read or mutation
/// passes. Bounds the number of resident pages, gates every access through
/// the lock table, and implements transaction commit and abort.
///
/// There is no write-ahead log: commit writes dirtied pages in place and
/// abort re-reads them from disk. Rollback therefore depends on dirty pages
/// never being evicted before commit, which the eviction policy enforces.
pub struct BufferPool {
    pages: DashMap<PageId, Arc<RwLock<HeapPage>>>,
    tables: DashMap<TableId, Arc<Mutex<HeapFile>>>,
    lock_table: LockTable,
    tid_generator: TransactionIdGenerator,
    capacity: usize,
}

/// Default number of resident pages.
pub const DEFAULT_CAPACITY: usize = 50;

impl BufferPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            pages: DashMap::new(),
            tables: DashMap::new(),
            lock_table: LockTable::new(),
            tid_generator: TransactionIdGenerator::new(),
            capacity,
        }
    }

    /// Registers the heap file backing a relation so page I/O can be routed
    /// to it. Catalog management proper lives above this layer.
    pub fn register_table(&self, table_id: TableId, file: HeapFile) {
        self.tables.insert(table_id, Arc::new(Mutex::new(file)));
    }

    pub fn next_transaction_id(&self) -> TransactionId {
        self.tid_generator.next()
    }

    fn table(&self, table_id: TableId) -> StorageResult<Arc<Mutex<HeapFile>>> {
        self.tables
            .get(&table_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(StorageError::UnknownTable(table_id))
    }

    /// Number of pages currently in the relation's heap file.
    pub fn num_pages(&self, table_id: TableId) -> StorageResult<u32> {
        let file = self.table(table_id)?;
        let n = file.lock().num_pages()?;
        Ok(n)
    }

    /// Fetches a page on behalf of a transaction, blocking (by retrying)
    /// until the page lock is granted or the transaction is selected as a
    /// deadlock victim. On victim selection the transaction's locks are
    /// released and its in-memory writes discarded before the abort signal
    /// propagates to the caller.
    pub fn fetch(
        &self,
        tid: TransactionId,
        pid: PageId,
        perm: Permission,
    ) -> StorageResult<Arc<RwLock<HeapPage>>> {
        let mode = perm.lock_mode();
        loop {
            match self.lock_table.acquire(tid, pid, mode) {
                Ok(true) => break,
                Ok(false) => thread::yield_now(),
                Err(StorageError::TransactionAborted(victim)) => {
                    debug!("{} selected as deadlock victim, rolling back", victim);
                    self.transaction_complete(tid, false)?;
                    return Err(StorageError::TransactionAborted(victim));
                }
                Err(e) => return Err(e),
            }
        }
        self.admit(pid)
    }

    /// Returns the resident page, loading it from disk on first reference
    /// and evicting another page first if the pool is at capacity.
    fn admit(&self, pid: PageId) -> StorageResult<Arc<RwLock<HeapPage>>> {
        if let Some(entry) = self.pages.get(&pid) {
            return Ok(Arc::clone(entry.value()));
        }

        if self.pages.len() >= self.capacity {
            self.evict()?;
        }

        let file = self.table(pid.table_id)?;
        let page = file.lock().read_page(pid)?;
        let page = Arc::new(RwLock::new(page));
        // A racing admit of the same pid must not install two instances.
        let entry = self.pages.entry(pid).or_insert(page);
        Ok(Arc::clone(entry.value()))
    }

    /// Evicts one page to make room. Preference order: an unlocked clean
    /// page, then a clean page whose locks are all SHARED (those locks are
    /// revoked, a deliberate two-phase locking violation tolerated because
    /// read locks guard no in-memory writes). Dirty pages are never evicted;
    /// if every resident page is dirty the admission fails.
    ///
    /// Victims are only selected during the map iteration; removal happens
    /// afterwards, since the iterator pins the shard a removal would need.
    fn evict(&self) -> StorageResult<()> {
        let mut unlocked_victim = None;
        let mut shared_locked_victim = None;
        for entry in self.pages.iter() {
            let pid = *entry.key();
            if entry.value().read().dirtied_by().is_some() {
                continue;
            }
            if !self.lock_table.is_locked(pid) {
                unlocked_victim = Some(pid);
                break;
            }
            if shared_locked_victim.is_none() && self.lock_table.is_only_shared(pid) {
                shared_locked_victim = Some(pid);
            }
        }

        if let Some(pid) = unlocked_victim {
            if self.remove_if_unlocked(pid) {
                trace!("evicted clean unlocked page {}", pid);
                return Ok(());
            }
        }
        if let Some(pid) = shared_locked_victim {
            self.lock_table.revoke_page(pid);
            if self.remove_if_unlocked(pid) {
                debug!("evicted page {} after revoking its shared locks", pid);
                return Ok(());
            }
        }
        Err(StorageError::CacheExhausted)
    }

    /// Drops `pid` from the page map unless a lock appeared after victim
    /// selection. A fetch racing the removal may already hold the resident
    /// instance; reinstating it keeps the lock holder and the map agreed on
    /// one page object, so its writes cannot be orphaned.
    fn remove_if_unlocked(&self, pid: PageId) -> bool {
        match self.pages.remove(&pid) {
            Some((_, page)) => {
                if self.lock_table.is_locked(pid) {
                    self.pages.entry(pid).or_insert(page);
                    false
                } else {
                    true
                }
            }
            None => false,
        }
    }

    /// Releases a page lock outside the two-phase discipline. Unsafe for
    /// callers that performed any intervening write to the page.
    pub fn release_unsafe(&self, tid: TransactionId, pid: PageId) {
        self.lock_table.release(tid, pid);
    }

    pub fn holds_lock(&self, tid: TransactionId, pid: PageId) -> bool {
        self.lock_table.holds_lock(tid, pid)
    }

    /// Adds a tuple to the relation on behalf of `tid`. Existing pages are
    /// scanned in ascending order under exclusive locks; a full page the
    /// transaction has not dirtied is released immediately, since the lock
    /// guards no write of ours. If no page has room, an empty page is
    /// appended to the file first and the tuple placed in it.
    pub fn insert(&self, tid: TransactionId, table_id: TableId, tuple: Tuple) -> StorageResult<()> {
        let file = self.table(table_id)?;
        let page_count = file.lock().num_pages()?;

        for page_no in 0..page_count {
            let pid = PageId::new(table_id, page_no);
            let page = self.fetch(tid, pid, Permission::ReadWrite)?;
            let mut guard = page.write();
            if guard.empty_slot_count() > 0 {
                guard.insert_tuple(tuple)?;
                guard.set_dirty(tid);
                return Ok(());
            }
            let dirtied_here = guard.dirtied_by() == Some(tid);
            drop(guard);
            if !dirtied_here {
                self.release_unsafe(tid, pid);
            }
        }

        // Every existing page is full: extend the file with an empty page,
        // written through immediately, then place the tuple in it.
        let pid = {
            let mut file = file.lock();
            file.append_empty_page(table_id)?.pid()
        };
        let page = self.fetch(tid, pid, Permission::ReadWrite)?;
        let mut guard = page.write();
        guard.insert_tuple(tuple)?;
        guard.set_dirty(tid);
        Ok(())
    }

    /// Removes a stored tuple, located through its RecordId, on behalf of
    /// `tid`.
    pub fn delete(&self, tid: TransactionId, tuple: &Tuple) -> StorageResult<()> {
        let rid = tuple.record_id.ok_or_else(|| {
            StorageError::IntegrityViolation("cannot delete a tuple that was never stored".to_string())
        })?;
        let page = self.fetch(tid, rid.page_id, Permission::ReadWrite)?;
        let mut guard = page.write();
        guard.delete_tuple(tuple)?;
        guard.set_dirty(tid);
        Ok(())
    }

    /// Commits or aborts a transaction. Commit writes every page the
    /// transaction holds a lock on through to disk and clears its dirty
    /// flag; abort replaces each resident held page with a fresh read from
    /// disk, undoing uncommitted in-memory mutations. Both paths release
    /// all of the transaction's locks and purge its wait-for graph node.
    pub fn transaction_complete(&self, tid: TransactionId, commit: bool) -> StorageResult<()> {
        let held = self.lock_table.pages_locked_by(tid);
        debug!(
            "{} {} with {} held page(s)",
            tid,
            if commit { "committing" } else { "aborting" },
            held.len()
        );
        for pid in held {
            if commit {
                self.flush_page(pid)?;
            } else if self.pages.contains_key(&pid) {
                let file = self.table(pid.table_id)?;
                let fresh = file.lock().read_page(pid)?;
                self.pages.insert(pid, Arc::new(RwLock::new(fresh)));
            }
            self.lock_table.release(tid, pid);
        }
        self.lock_table.purge_transaction(tid);
        Ok(())
    }

    /// Writes the page through to disk if it is resident and dirty.
    fn flush_page(&self, pid: PageId) -> StorageResult<()> {
        if let Some(entry) = self.pages.get(&pid) {
            let page = Arc::clone(entry.value());
            drop(entry);
            let mut guard = page.write();
            if guard.dirtied_by().is_some() {
                let file = self.table(pid.table_id)?;
                file.lock().write_page(&guard)?;
                guard.set_clean();
            }
        }
        Ok(())
    }

    /// Writes every dirty resident page to disk. Breaks abort isolation
    /// for uncommitted transactions; test support only.
    pub fn flush_all_pages(&self) -> StorageResult<()> {
        let pids: Vec<PageId> = self.pages.iter().map(|e| *e.key()).collect();
        for pid in pids {
            self.flush_page(pid)?;
        }
        Ok(())
    }

    /// Forcibly drops a page from the cache without writing it back.
    pub fn discard(&self, pid: PageId) {
        self.pages.remove(&pid);
    }

    #[cfg(test)]
    fn resident_count(&self) -> usize {
        self.pages.len()
    }
}
