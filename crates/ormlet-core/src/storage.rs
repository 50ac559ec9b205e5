//! The abstract statement-execution port.
//!
//! The engine never depends on a concrete driver; a session owns exactly one
//! port for its lifetime and releases it on commit, rollback or failure.

use crate::error::Error;
use crate::value::Value;

/// A lazily paginated stream of result rows.
pub trait RowCursor {
    /// Fetch the next row in the column order of the compiled statement,
    /// or `None` when exhausted.
    fn next_row(&mut self) -> Result<Option<Vec<Value>>, Error>;
}

/// One storage connection executing parameterized statements.
///
/// Calls may block; timeouts are the port implementation's concern.
pub trait StoragePort {
    /// Execute a SELECT and stream its rows.
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<Box<dyn RowCursor>, Error>;

    /// Execute an INSERT/UPDATE/DELETE, returning the affected row count.
    fn execute_update(&mut self, sql: &str, params: &[Value]) -> Result<u64, Error>;

    /// Commit the current transaction.
    fn commit(&mut self) -> Result<(), Error>;

    /// Roll back the current transaction.
    fn rollback(&mut self) -> Result<(), Error>;

    /// Release the underlying resource. Must be idempotent; called from
    /// failure handlers as well as regular session teardown.
    fn close(&mut self) {}
}

/// A cursor over rows already in memory.
pub struct VecCursor {
    rows: std::vec::IntoIter<Vec<Value>>,
}

impl VecCursor {
    /// Wrap buffered rows.
    pub fn new(rows: Vec<Vec<Value>>) -> Self {
        VecCursor {
            rows: rows.into_iter(),
        }
    }
}

impl RowCursor for VecCursor {
    fn next_row(&mut self) -> Result<Option<Vec<Value>>, Error> {
        Ok(self.rows.next())
    }
}
