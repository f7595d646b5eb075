use crate::concurrency::wait_graph::WaitForGraph;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::PageId;
use crate::transaction::TransactionId;
use log::{debug, warn};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Lock modes supported by the lock table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Shared lock for read access.
    Shared,
    /// Exclusive lock for write access.
    Exclusive,
}

impl LockMode {
    /// Two locks can coexist on a page only if both are shared.
    pub fn is_compatible_with(&self, other: &LockMode) -> bool {
        matches!((self, other), (LockMode::Shared, LockMode::Shared))
    }
}

#[derive(Default)]
struct LockTableInner {
    /// Per-page set of granted locks, one entry per holding transaction.
    locks: HashMap<PageId, HashMap<TransactionId, LockMode>>,
    graph: WaitForGraph,
}

/// Per-page, per-transaction lock table under strict two-phase locking.
///
/// `acquire` never blocks: it either grants immediately, or registers
/// wait-for edges and returns `Ok(false)` for the caller to retry, or
/// returns `TransactionAborted` when the wait would close a deadlock cycle.
/// A single mutex covers both the lock map and the wait-for graph, so no
/// caller ever observes one updated without the other.
#[derive(Default)]
pub struct LockTable {
    inner: Mutex<LockTableInner>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts to take (or upgrade to) a lock on `pid` for `tid`.
    pub fn acquire(&self, tid: TransactionId, pid: PageId, mode: LockMode) -> StorageResult<bool> {
        let mut guard = self.inner.lock();
        let LockTableInner { locks, graph } = &mut *guard;

        let holders = locks.entry(pid).or_default();
        if holders.is_empty() {
            // No locks on the page: grant in the requested mode.
            holders.insert(tid, mode);
            return Ok(true);
        }

        if let Some(&held) = holders.get(&tid) {
            match mode {
                // The held lock, whichever mode, already covers a read.
                LockMode::Shared => return Ok(true),
                LockMode::Exclusive => {
                    if held == LockMode::Exclusive {
                        return Ok(true);
                    }
                    if holders.len() == 1 {
                        debug!("upgrading {} to exclusive on page {}", tid, pid);
                        holders.insert(tid, LockMode::Exclusive);
                        return Ok(true);
                    }
                    // Other readers present: wait for them to drain.
                    return Self::deny(graph, tid, pid, mode, holders);
                }
            }
        }

        let all_shared = holders.values().all(|&m| m == LockMode::Shared);
        if mode == LockMode::Shared && all_shared {
            holders.insert(tid, LockMode::Shared);
            return Ok(true);
        }
        Self::deny(graph, tid, pid, mode, holders)
    }

    /// Registers wait-for edges for a denied request. Translates a detected
    /// cycle into the requester's abort signal.
    fn deny(
        graph: &mut WaitForGraph,
        tid: TransactionId,
        pid: PageId,
        mode: LockMode,
        holders: &HashMap<TransactionId, LockMode>,
    ) -> StorageResult<bool> {
        match graph.add_dependencies(tid, pid, mode, holders) {
            Ok(()) => Ok(false),
            Err(_) => {
                warn!("deadlock: aborting {} waiting for page {}", tid, pid);
                Err(StorageError::TransactionAborted(tid))
            }
        }
    }

    /// Drops `tid`'s lock on `pid` along with any wait-for edges on it.
    pub fn release(&self, tid: TransactionId, pid: PageId) {
        let mut guard = self.inner.lock();
        let LockTableInner { locks, graph } = &mut *guard;
        if let Some(holders) = locks.get_mut(&pid) {
            if holders.remove(&tid).is_some() {
                if holders.is_empty() {
                    locks.remove(&pid);
                }
                graph.remove_edges_to(pid, tid);
            }
        }
    }

    /// Strips every lock on `pid` if all of them are SHARED, returning
    /// whether the locks were revoked. The check and the removal happen
    /// under the one mutex, so an upgrade cannot slip in between them.
    pub fn revoke_page(&self, pid: PageId) -> bool {
        let mut guard = self.inner.lock();
        let LockTableInner { locks, graph } = &mut *guard;
        let all_shared = locks
            .get(&pid)
            .is_some_and(|holders| holders.values().all(|&m| m == LockMode::Shared));
        if !all_shared {
            return false;
        }
        if let Some(holders) = locks.remove(&pid) {
            for tid in holders.into_keys() {
                graph.remove_edges_to(pid, tid);
            }
        }
        true
    }

    pub fn holds_lock(&self, tid: TransactionId, pid: PageId) -> bool {
        self.inner
            .lock()
            .locks
            .get(&pid)
            .is_some_and(|holders| holders.contains_key(&tid))
    }

    pub fn is_locked(&self, pid: PageId) -> bool {
        self.inner.lock().locks.contains_key(&pid)
    }

    /// True if the page is locked and every holder is SHARED.
    pub fn is_only_shared(&self, pid: PageId) -> bool {
        self.inner
            .lock()
            .locks
            .get(&pid)
            .is_some_and(|holders| holders.values().all(|&m| m == LockMode::Shared))
    }

    /// Every page `tid` currently holds a lock on.
    pub fn pages_locked_by(&self, tid: TransactionId) -> Vec<PageId> {
        self.inner
            .lock()
            .locks
            .iter()
            .filter(|(_, holders)| holders.contains_key(&tid))
            .map(|(&pid, _)| pid)
            .collect()
    }

    /// Removes `tid`'s wait-for graph node and incident edges. Called once
    /// at transaction end, after its locks have been released.
    pub fn purge_transaction(&self, tid: TransactionId) {
        self.inner.lock().graph.purge(tid);
    }
}
