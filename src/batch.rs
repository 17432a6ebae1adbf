//! Batch accumulation: groups transformed rows into `copy_every`-sized
//! batches and signals `commit_every` boundaries.
//!
//! Commits only happen at batch boundaries. When `commit_every` is not
//! a multiple of `copy_every`, the commit fires at the first batch
//! boundary at or after the threshold and the running counter resets —
//! there are no partial-batch commits.

/// A row after per-column reformatting, ready for bulk submission.
///
/// `raw` is carried along so the reject file can record the row
/// verbatim if the store refuses it.
#[derive(Debug, Clone)]
pub struct TransformedRow {
    /// Input record number, for reject log entries.
    pub position: u64,

    /// The record exactly as read, for the reject data file.
    pub raw: String,

    /// One value per configured column; `None` loads as SQL NULL.
    pub values: Vec<Option<String>>,
}

/// An ordered group of rows submitted together through COPY.
#[derive(Debug)]
pub struct Batch {
    pub rows: Vec<TransformedRow>,

    /// True when the commit threshold was reached at this boundary: the
    /// executor commits the transaction after this batch lands.
    pub commit_after: bool,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Accumulates rows and yields full batches.
#[derive(Debug)]
pub struct BatchAccumulator {
    copy_every: usize,
    commit_every: usize,
    pending: Vec<TransformedRow>,
    since_commit: usize,
}

impl BatchAccumulator {
    pub fn new(copy_every: usize, commit_every: usize) -> Self {
        Self {
            copy_every,
            commit_every,
            pending: Vec::with_capacity(copy_every),
            since_commit: 0,
        }
    }

    /// Add one row; returns a batch once `copy_every` rows are pending.
    pub fn push(&mut self, row: TransformedRow) -> Option<Batch> {
        self.pending.push(row);
        if self.pending.len() >= self.copy_every {
            Some(self.take())
        } else {
            None
        }
    }

    /// Final short batch at end of input, if any rows are pending.
    pub fn flush(&mut self) -> Option<Batch> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.take())
        }
    }

    fn take(&mut self) -> Batch {
        let rows = std::mem::take(&mut self.pending);
        self.pending = Vec::with_capacity(self.copy_every);

        self.since_commit += rows.len();
        let commit_after = self.since_commit >= self.commit_every;
        if commit_after {
            self.since_commit = 0;
        }

        Batch { rows, commit_after }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(position: u64) -> TransformedRow {
        TransformedRow {
            position,
            raw: format!("{position}|x"),
            values: vec![Some(position.to_string()), Some("x".to_string())],
        }
    }

    fn drain(copy_every: usize, commit_every: usize, n: u64) -> Vec<Batch> {
        let mut acc = BatchAccumulator::new(copy_every, commit_every);
        let mut batches = Vec::new();
        for position in 1..=n {
            if let Some(batch) = acc.push(row(position)) {
                batches.push(batch);
            }
        }
        if let Some(batch) = acc.flush() {
            batches.push(batch);
        }
        batches
    }

    #[test]
    fn test_batch_sizes() {
        let batches = drain(3, 100, 7);
        let sizes: Vec<usize> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
    }

    #[test]
    fn test_row_order_preserved() {
        let batches = drain(2, 100, 5);
        let positions: Vec<u64> = batches
            .iter()
            .flat_map(|b| b.rows.iter().map(|r| r.position))
            .collect();
        assert_eq!(positions, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_commit_every_third_batch() {
        // copy_every = 2, commit_every = 6: every 3rd batch commits.
        let batches = drain(2, 6, 12);
        let commits: Vec<bool> = batches.iter().map(|b| b.commit_after).collect();
        assert_eq!(commits, vec![false, false, true, false, false, true]);
    }

    #[test]
    fn test_commit_rounds_up_to_batch_boundary() {
        // commit_every = 5 is not a multiple of copy_every = 2: the
        // commit fires at the first boundary at or after 5 rows (row 6),
        // then the counter restarts.
        let batches = drain(2, 5, 12);
        let commits: Vec<bool> = batches.iter().map(|b| b.commit_after).collect();
        assert_eq!(commits, vec![false, false, true, false, false, true]);
    }

    #[test]
    fn test_no_commit_mid_batch() {
        // A single oversized threshold never splits a batch.
        let batches = drain(4, 2, 8);
        let sizes: Vec<usize> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![4, 4]);
        assert!(batches.iter().all(|b| b.commit_after));
    }

    #[test]
    fn test_flush_empty_is_none() {
        let mut acc = BatchAccumulator::new(3, 9);
        assert!(acc.flush().is_none());
    }
}
