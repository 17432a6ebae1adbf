//! In-memory [`BulkStore`]: backs `--dry-run` and the engine tests.
//!
//! Mirrors the transactional behavior the engine relies on: rows move
//! from the current savepoint segment into the open transaction on
//! `commit_segment`, and into committed storage on `commit`. Failure
//! injection is by input record position, so tests can mark exactly
//! which rows the "store" refuses.

use std::collections::HashSet;

use crate::batch::TransformedRow;
use crate::error::{StoreError, StoreResult};
use crate::store::BulkStore;

/// An in-memory store with optional failure injection.
#[derive(Debug, Default)]
pub struct MemStore {
    committed: Vec<Vec<Option<String>>>,
    tx: Vec<Vec<Option<String>>>,
    segment: Vec<Vec<Option<String>>>,

    fail_positions: HashSet<u64>,
    connection_error_at: Option<usize>,

    /// Number of COPY attempts seen, including refused ones.
    pub copy_attempts: usize,

    /// Tables truncated, in order.
    pub truncated: Vec<String>,
}

impl MemStore {
    /// A store that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that refuses any batch containing one of these input
    /// record positions.
    pub fn failing(positions: impl IntoIterator<Item = u64>) -> Self {
        Self {
            fail_positions: positions.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Drop the connection on the n-th COPY attempt (1-based).
    pub fn with_connection_error_at(mut self, attempt: usize) -> Self {
        self.connection_error_at = Some(attempt);
        self
    }

    /// Rows committed so far, in arrival order.
    pub fn committed_rows(&self) -> &[Vec<Option<String>>] {
        &self.committed
    }

    /// Rows accepted but not yet committed.
    pub fn uncommitted_count(&self) -> usize {
        self.tx.len() + self.segment.len()
    }
}

impl BulkStore for MemStore {
    fn begin(&mut self) -> StoreResult<()> {
        self.tx.clear();
        self.segment.clear();
        Ok(())
    }

    fn commit(&mut self) -> StoreResult<()> {
        self.tx.append(&mut self.segment);
        self.committed.append(&mut self.tx);
        Ok(())
    }

    fn rollback(&mut self) -> StoreResult<()> {
        self.tx.clear();
        self.segment.clear();
        Ok(())
    }

    fn begin_segment(&mut self) -> StoreResult<()> {
        Ok(())
    }

    fn commit_segment(&mut self) -> StoreResult<()> {
        self.tx.append(&mut self.segment);
        Ok(())
    }

    fn rollback_segment(&mut self) -> StoreResult<()> {
        self.segment.clear();
        Ok(())
    }

    fn copy_in(
        &mut self,
        _table: &str,
        _columns: &[String],
        rows: &[TransformedRow],
    ) -> StoreResult<()> {
        self.copy_attempts += 1;

        if self.connection_error_at == Some(self.copy_attempts) {
            return Err(StoreError::Connection("connection reset".to_string()));
        }

        if let Some(bad) = rows.iter().find(|r| self.fail_positions.contains(&r.position)) {
            return Err(StoreError::Data(format!(
                "invalid input in record {}",
                bad.position
            )));
        }

        self.segment.extend(rows.iter().map(|r| r.values.clone()));
        Ok(())
    }

    fn truncate(&mut self, table: &str) -> StoreResult<()> {
        self.truncated.push(table.to_string());
        self.committed.clear();
        Ok(())
    }
}
