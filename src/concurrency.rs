//! Two-phase locking for page access.
//!
//! The lock table grants shared/exclusive page locks per transaction and
//! never blocks: a denied request registers wait-for edges and returns, and
//! the caller retries. Deadlocks are detected synchronously on every edge
//! insertion; the requesting transaction is always the victim.

pub mod lock;
pub mod wait_graph;

pub use lock::{LockMode, LockTable};
