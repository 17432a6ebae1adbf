//! Batch submission and bisection recovery.
//!
//! A batch goes to the store's COPY primitive inside a savepoint. When
//! the store refuses it with a data error, the batch is split in half
//! and each half resubmitted, recursively, until single rows isolate
//! the culprits; those are reject-logged and everything else loads.
//! The store never needs to say *which* row was bad - only that some
//! row was.
//!
//! Cost: a batch of N rows makes at most `2N - 1` submission attempts
//! (every row bad), and `O(log N)` to isolate a single bad row.
//! Connection-level errors abort recovery immediately instead of being
//! mistaken for data rejects.

use tracing::{debug, warn};

use crate::batch::{Batch, TransformedRow};
use crate::error::{LoadResult, StoreError, StoreResult};
use crate::loader::LazyRejects;
use crate::store::BulkStore;

/// Drives COPY submissions for one section.
pub(crate) struct BulkExecutor<'a> {
    store: &'a mut dyn BulkStore,
    table: &'a str,
    columns: &'a [String],
}

impl<'a> BulkExecutor<'a> {
    pub(crate) fn new(
        store: &'a mut dyn BulkStore,
        table: &'a str,
        columns: &'a [String],
    ) -> Self {
        Self {
            store,
            table,
            columns,
        }
    }

    /// Submit one batch, recovering refused rows by bisection.
    ///
    /// Returns `(rows_loaded, rows_rejected)`; the two always sum to
    /// the batch length. Commits the transaction afterwards when the
    /// batch carries the commit signal.
    pub(crate) fn submit(
        &mut self,
        batch: &Batch,
        rejects: &mut LazyRejects,
    ) -> LoadResult<(u64, u64)> {
        let counts = self.load_slice(&batch.rows, rejects)?;

        if batch.commit_after {
            debug!(table = self.table, "commit boundary");
            self.store.commit()?;
            self.store.begin()?;
        }

        Ok(counts)
    }

    /// Commit whatever the transaction still holds at end of input.
    pub(crate) fn finish(&mut self) -> LoadResult<()> {
        self.store.commit()?;
        Ok(())
    }

    /// Load a slice of rows, bisecting on data errors.
    fn load_slice(
        &mut self,
        rows: &[TransformedRow],
        rejects: &mut LazyRejects,
    ) -> LoadResult<(u64, u64)> {
        if rows.is_empty() {
            return Ok((0, 0));
        }

        match self.try_copy(rows) {
            Ok(()) => Ok((rows.len() as u64, 0)),

            Err(StoreError::Data(reason)) => {
                if rows.len() == 1 {
                    let row = &rows[0];
                    warn!(
                        table = self.table,
                        position = row.position,
                        reason = reason.as_str(),
                        "row rejected"
                    );
                    rejects.log(row.position, &row.raw, &reason)?;
                    Ok((0, 1))
                } else {
                    debug!(
                        table = self.table,
                        rows = rows.len(),
                        "batch refused, bisecting"
                    );
                    let mid = rows.len().div_ceil(2);
                    let (left_ok, left_bad) = self.load_slice(&rows[..mid], rejects)?;
                    let (right_ok, right_bad) = self.load_slice(&rows[mid..], rejects)?;
                    Ok((left_ok + right_ok, left_bad + right_bad))
                }
            }

            // Not a data problem: the store itself is gone. Do not
            // mistake it for a reject - abort the section.
            Err(err @ StoreError::Connection(_)) => Err(err.into()),
        }
    }

    /// One COPY attempt fenced by a savepoint, so a refusal leaves
    /// earlier uncommitted batches intact.
    fn try_copy(&mut self, rows: &[TransformedRow]) -> StoreResult<()> {
        self.store.begin_segment()?;
        match self.store.copy_in(self.table, self.columns, rows) {
            Ok(()) => self.store.commit_segment(),
            Err(err) => {
                if err.is_data() {
                    self.store.rollback_segment()?;
                }
                Err(err)
            }
        }
    }
}
