//! The capability the unit of work needs from a store.

use crate::error::Result;
use crate::query::SqlQuery;

/// Outcome of running a write statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Execution {
    pub rows_affected: usize,
    pub last_insert_id: i64,
}

/// Runs built statements and controls transactions.
///
/// Implemented by [`crate::Connection`]; tests substitute recording
/// executors to observe the replayed statement sequence.
pub trait Executor {
    fn run(&mut self, query: &SqlQuery) -> Result<Execution>;

    fn begin_transaction(&mut self) -> Result<()>;

    fn commit_transaction(&mut self) -> Result<()>;

    fn rollback_transaction(&mut self) -> Result<()>;

    fn in_transaction(&self) -> bool;

    /// Mark a point inside the open transaction that can be rolled back
    /// to without ending the transaction.
    fn savepoint(&mut self, name: &str) -> Result<()>;

    /// Forget a savepoint, keeping the work done since it was taken.
    fn release_savepoint(&mut self, name: &str) -> Result<()>;

    /// Undo the work done since the savepoint, then release it.
    fn rollback_to_savepoint(&mut self, name: &str) -> Result<()>;
}
