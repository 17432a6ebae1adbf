//! Reject logging: the durable audit trail for refused rows.
//!
//! Each section owns two append-only files in the reject directory,
//! named deterministically so reruns extend them:
//!
//! - `<section>.rej` - offending rows verbatim, in input format, so the
//!   file can be fixed up and fed back through the same section
//! - `<section>.rej.log` - one JSON line per reject: input record
//!   position, error text, timestamp
//!
//! Every entry is flushed before [`RejectLogger::log`] returns; a crash
//! later in the section never loses or truncates an already-logged
//! reject.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// One structured entry in `<section>.rej.log`.
#[derive(Debug, Serialize)]
struct RejectEntry<'a> {
    position: u64,
    reason: &'a str,
    at: String,
}

/// Append-only reject sink for one section.
pub struct RejectLogger {
    data_path: PathBuf,
    log_path: PathBuf,
    data: File,
    log: File,
}

impl RejectLogger {
    /// Open (or create) the section's reject files in append mode.
    pub fn open(reject_dir: &Path, section: &str) -> std::io::Result<Self> {
        std::fs::create_dir_all(reject_dir)?;

        let data_path = reject_dir.join(format!("{section}.rej"));
        let log_path = reject_dir.join(format!("{section}.rej.log"));

        let data = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&data_path)?;
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        Ok(Self {
            data_path,
            log_path,
            data,
            log,
        })
    }

    /// Record one reject: raw row first, then the reason entry, both
    /// flushed before returning.
    pub fn log(&mut self, position: u64, raw: &str, reason: &str) -> std::io::Result<()> {
        self.data.write_all(raw.as_bytes())?;
        self.data.write_all(b"\n")?;
        self.data.flush()?;

        let entry = RejectEntry {
            position,
            reason,
            at: chrono::Utc::now().to_rfc3339(),
        };
        // Infallible for this struct; keep the io::Result surface.
        let line = serde_json::to_string(&entry).unwrap_or_default();
        self.log.write_all(line.as_bytes())?;
        self.log.write_all(b"\n")?;
        self.log.flush()?;

        Ok(())
    }

    /// Path of the verbatim reject data file.
    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    /// Path of the structured reject reason log.
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }
}
