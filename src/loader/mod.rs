//! Section loading: the per-section orchestrator.
//!
//! A [`SectionLoader`] wires the row reader, field reformatter, batch
//! accumulator, bulk executor and reject logger together for one
//! section, and exposes the lifecycle to the driver:
//!
//! ```text
//! Init -> Running -> Done
//!            |-----> Failed       (decode failure, connection loss)
//!            |-----> Interrupted  (external cancel flag)
//! ```
//!
//! Template sections skip straight to `Skipped`. In every terminal
//! state the transaction is closed and a summary is available - a
//! partial one when the section did not finish. Rows refused before the
//! store (wrong field count, reformat failure) are rejected locally;
//! rows refused by the store go through bisection recovery. Either way
//! each input row ends up counted exactly once, as loaded or rejected.

mod executor;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

use crate::batch::{BatchAccumulator, TransformedRow};
use crate::config::Section;
use crate::error::{LoadError, LoadResult};
use crate::reader::{RawRow, RowReader};
use crate::reformat::transform_field;
use crate::reject::RejectLogger;
use crate::stats::{SectionStats, Summary};
use crate::store::BulkStore;

use executor::BulkExecutor;

/// Lifecycle state of a section load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Init,
    Running,
    Done,
    Failed,
    Interrupted,
    /// Template sections are configuration-only and never run.
    Skipped,
}

impl LoadState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, LoadState::Init | LoadState::Running)
    }
}

/// Loads one section into the target store.
pub struct SectionLoader<'a> {
    section: Section,
    store: &'a mut dyn BulkStore,
    cancel: Arc<AtomicBool>,
    truncate: bool,
    state: LoadState,
    summary: Option<Summary>,
}

impl<'a> SectionLoader<'a> {
    /// Build a loader from a resolved section and the shared store
    /// handle. All configuration validation already happened in
    /// [`Section::resolve`].
    pub fn new(section: Section, store: &'a mut dyn BulkStore) -> Self {
        Self {
            section,
            store,
            cancel: Arc::new(AtomicBool::new(false)),
            truncate: false,
            state: LoadState::Init,
            summary: None,
        }
    }

    /// Install an external cancellation flag; checked at every row
    /// boundary while running.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Truncate the target table inside the load transaction before
    /// the first batch.
    pub fn with_truncate(mut self, truncate: bool) -> Self {
        self.truncate = truncate;
        self
    }

    /// True for template sections; the driver skips [`run`](Self::run).
    pub fn is_template(&self) -> bool {
        self.section.template
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    /// Path of the verbatim reject data file for this section.
    pub fn reject_data_path(&self) -> PathBuf {
        self.section
            .reject_dir
            .join(format!("{}.rej", self.section.name))
    }

    /// Path of the structured reject reason log for this section.
    pub fn reject_log_path(&self) -> PathBuf {
        self.section
            .reject_dir
            .join(format!("{}.rej.log", self.section.name))
    }

    /// Summary snapshot; available once the load reached a terminal
    /// state (partial counts when it failed or was interrupted).
    pub fn summary(&self) -> Option<&Summary> {
        self.summary.as_ref()
    }

    /// Execute the section state machine.
    pub fn run(&mut self) -> LoadResult<()> {
        if self.section.template {
            self.state = LoadState::Skipped;
            return Ok(());
        }

        info!(
            section = self.section.name.as_str(),
            table = self.section.table.as_str(),
            file = %self.section.filename.display(),
            "loading section"
        );

        self.state = LoadState::Running;
        let mut stats = SectionStats::start();
        let result = self.run_inner(&mut stats);

        self.state = match result {
            Ok(()) => LoadState::Done,
            Err(LoadError::Interrupted) => LoadState::Interrupted,
            Err(_) => LoadState::Failed,
        };
        self.summary = Some(stats.finish(&self.section.table));

        if let Some(summary) = &self.summary {
            info!(
                section = self.section.name.as_str(),
                rows_loaded = summary.rows_loaded,
                rows_rejected = summary.rows_rejected,
                state = ?self.state,
                "section finished"
            );
        }

        result
    }

    fn run_inner(&mut self, stats: &mut SectionStats) -> LoadResult<()> {
        let result = drive(
            &mut *self.store,
            &self.section,
            &self.cancel,
            self.truncate,
            stats,
        );

        if result.is_err() {
            // Terminal path: close the transaction no matter what. The
            // rollback result is secondary to the original error.
            let _ = self.store.rollback();
        }
        result
    }
}

/// The `Running` state: reader -> reformat -> batches -> store, until
/// the input is exhausted or something fatal happens.
fn drive(
    store: &mut dyn BulkStore,
    section: &Section,
    cancel: &AtomicBool,
    truncate: bool,
    stats: &mut SectionStats,
) -> LoadResult<()> {
    let reader = RowReader::open(section)?;
    let mut rejects = LazyRejects::new(section);
    let columns: Vec<String> = section.column_names();
    let mut accumulator = BatchAccumulator::new(section.copy_every, section.commit_every);

    store.begin()?;
    if truncate {
        store.truncate(&section.table)?;
    }

    let mut executor = BulkExecutor::new(store, &section.table, &columns);

    // Rows loaded but not yet committed: folded into the stats only at
    // commit boundaries, so a rollback on failure never counts rows
    // that did not survive.
    let mut pending_loaded: u64 = 0;

    for item in reader {
        if cancel.load(Ordering::Relaxed) {
            return Err(LoadError::Interrupted);
        }

        let row = item?;
        match transform_row(section, &row) {
            Ok(values) => {
                let transformed = TransformedRow {
                    position: row.position,
                    raw: row.raw,
                    values,
                };
                if let Some(batch) = accumulator.push(transformed) {
                    let committing = batch.commit_after;
                    let (loaded, rejected) = executor.submit(&batch, &mut rejects)?;
                    pending_loaded += loaded;
                    stats.add_rejected(rejected);
                    if committing {
                        stats.add_loaded(pending_loaded);
                        pending_loaded = 0;
                    }
                }
            }
            Err(reason) => {
                rejects.log(row.position, &row.raw, &reason)?;
                stats.add_rejected(1);
            }
        }
    }

    if let Some(batch) = accumulator.flush() {
        let committing = batch.commit_after;
        let (loaded, rejected) = executor.submit(&batch, &mut rejects)?;
        pending_loaded += loaded;
        stats.add_rejected(rejected);
        if committing {
            stats.add_loaded(pending_loaded);
            pending_loaded = 0;
        }
    }

    executor.finish()?;
    stats.add_loaded(pending_loaded);
    Ok(())
}

/// Reformat one raw row into column values, or give the reason it
/// cannot be loaded.
fn transform_row(section: &Section, row: &RawRow) -> Result<Vec<Option<String>>, String> {
    if row.fields.len() != section.columns.len() {
        return Err(format!(
            "expected {} fields, found {}",
            section.columns.len(),
            row.fields.len()
        ));
    }

    section
        .columns
        .iter()
        .zip(&row.fields)
        .map(|(column, raw)| {
            transform_field(
                column,
                raw,
                &section.null_sentinel,
                &section.empty_string,
                &section.blob_dir,
            )
            .map_err(|e| e.to_string())
        })
        .collect()
}

/// Reject files are only created once there is something to reject, so
/// clean loads leave no empty artifacts behind.
pub(crate) struct LazyRejects {
    reject_dir: PathBuf,
    section: String,
    logger: Option<RejectLogger>,
}

impl LazyRejects {
    fn new(section: &Section) -> Self {
        Self {
            reject_dir: section.reject_dir.clone(),
            section: section.name.clone(),
            logger: None,
        }
    }

    pub(crate) fn log(&mut self, position: u64, raw: &str, reason: &str) -> LoadResult<()> {
        let logger = match self.logger {
            Some(ref mut logger) => logger,
            None => {
                let logger = RejectLogger::open(&self.reject_dir, &self.section)
                    .map_err(LoadError::RejectLog)?;
                self.logger.insert(logger)
            }
        };
        logger
            .log(position, raw, reason)
            .map_err(LoadError::RejectLog)
    }
}
