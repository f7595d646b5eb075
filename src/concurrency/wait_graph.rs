use crate::concurrency::lock::LockMode;
use crate::storage::page::PageId;
use crate::transaction::TransactionId;
use std::collections::{HashMap, HashSet, VecDeque};

/// Raised when a proposed wait-for edge set closes a cycle. The requester's
/// edges have already been purged when this is returned.
#[derive(Debug)]
pub struct Deadlock;

/// Wait-for graph over transactions. An edge `A -> (p, B)` records that A is
/// blocked on page p, which is held by B. Nodes are created lazily for both
/// requesters and owners so cycle detection sees every transaction that
/// appears on either end of an edge.
#[derive(Debug, Default)]
pub struct WaitForGraph {
    edges: HashMap<TransactionId, HashSet<(PageId, TransactionId)>>,
}

impl WaitForGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the edges implied by a denied lock request: an EXCLUSIVE
    /// request waits on every holder, a SHARED request only on EXCLUSIVE
    /// holders. Rejects the insertion and purges the requester's edges if a
    /// cycle would result.
    pub fn add_dependencies(
        &mut self,
        requester: TransactionId,
        pid: PageId,
        mode: LockMode,
        holders: &HashMap<TransactionId, LockMode>,
    ) -> Result<(), Deadlock> {
        for (&owner, &held) in holders {
            if mode == LockMode::Exclusive || held == LockMode::Exclusive {
                self.add_edge(requester, owner, pid)?;
            }
        }
        Ok(())
    }

    fn add_edge(
        &mut self,
        requester: TransactionId,
        owner: TransactionId,
        pid: PageId,
    ) -> Result<(), Deadlock> {
        if requester == owner {
            return Ok(());
        }
        self.edges.entry(owner).or_default();
        self.edges
            .entry(requester)
            .or_default()
            .insert((pid, owner));

        if self.has_cycle() {
            self.edges.remove(&requester);
            return Err(Deadlock);
        }
        Ok(())
    }

    /// Cycle check by Kahn's topological sort: repeatedly strip nodes with
    /// in-degree zero; anything left over lies on a cycle.
    fn has_cycle(&self) -> bool {
        let mut in_degree: HashMap<TransactionId, usize> = HashMap::new();
        for (&source, targets) in &self.edges {
            in_degree.entry(source).or_insert(0);
            for &(_, dest) in targets {
                *in_degree.entry(dest).or_insert(0) += 1;
            }
        }

        let total = in_degree.len();
        let mut queue: VecDeque<TransactionId> = in_degree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(&t, _)| t)
            .collect();

        let mut visited = 0;
        while let Some(current) = queue.pop_front() {
            visited += 1;
            if let Some(targets) = self.edges.get(&current) {
                for &(_, dest) in targets {
                    if let Some(d) = in_degree.get_mut(&dest) {
                        *d -= 1;
                        if *d == 0 {
                            queue.push_back(dest);
                        }
                    }
                }
            }
        }
        visited != total
    }

    /// Removes every edge waiting on `tid`'s lock on `pid`. Called whenever
    /// that lock is released so stale edges never outlive the lock.
    pub fn remove_edges_to(&mut self, pid: PageId, tid: TransactionId) {
        for targets in self.edges.values_mut() {
            targets.remove(&(pid, tid));
        }
    }

    /// Drops `tid`'s node and every incident edge. Called at transaction
    /// end so the node set cannot grow across transaction lifetimes.
    pub fn purge(&mut self, tid: TransactionId) {
        self.edges.remove(&tid);
        for targets in self.edges.values_mut() {
            targets.retain(|&(_, dest)| dest != tid);
        }
    }

    #[cfg(test)]
    fn node_count(&self) -> usize {
        self.edges.len()
    }
}
