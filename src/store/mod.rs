//! Target store abstraction.
//!
//! The engine only ever talks to a [`BulkStore`]: transaction control,
//! savepoint-scoped batch segments, a COPY-style bulk insert, and
//! truncation. [`PgStore`] implements it over a PostgreSQL connection;
//! [`MemStore`] is an in-memory stand-in used for dry runs and tests.
//!
//! Every operation reports failures as [`StoreError`], already split
//! into `Data` (bisection applies) and `Connection` (fatal) so callers
//! never have to parse message text.

mod mem;
mod postgres;

pub use mem::MemStore;
pub use postgres::PgStore;

use crate::batch::TransformedRow;
use crate::error::StoreResult;

/// A relational store with a bulk-load primitive.
///
/// One section loader uses the store at a time; methods take
/// `&mut self`, which makes the single-connection sequential discipline
/// structural rather than conventional.
pub trait BulkStore {
    /// Open the section's transaction.
    fn begin(&mut self) -> StoreResult<()>;

    /// Commit everything accepted since the last commit.
    fn commit(&mut self) -> StoreResult<()>;

    /// Discard everything accepted since the last commit.
    fn rollback(&mut self) -> StoreResult<()>;

    /// Open a savepoint around one batch submission attempt.
    fn begin_segment(&mut self) -> StoreResult<()>;

    /// Release the current batch savepoint, keeping its rows.
    fn commit_segment(&mut self) -> StoreResult<()>;

    /// Roll back to the current batch savepoint, discarding its rows
    /// but keeping earlier uncommitted batches intact.
    fn rollback_segment(&mut self) -> StoreResult<()>;

    /// Bulk-load rows into the table via the store's COPY primitive.
    fn copy_in(
        &mut self,
        table: &str,
        columns: &[String],
        rows: &[TransformedRow],
    ) -> StoreResult<()>;

    /// Empty the target table before loading.
    fn truncate(&mut self, table: &str) -> StoreResult<()>;
}

/// Render one row in COPY text format: tab-separated, `\N` for NULL,
/// backslash escapes for the separator/terminator characters.
pub(crate) fn format_copy_row(row: &TransformedRow) -> String {
    let mut line = String::new();
    for (i, value) in row.values.iter().enumerate() {
        if i > 0 {
            line.push('\t');
        }
        match value {
            None => line.push_str("\\N"),
            Some(s) => escape_copy_text(s, &mut line),
        }
    }
    line.push('\n');
    line
}

fn escape_copy_text(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: Vec<Option<&str>>) -> TransformedRow {
        TransformedRow {
            position: 1,
            raw: String::new(),
            values: values
                .into_iter()
                .map(|v| v.map(str::to_string))
                .collect(),
        }
    }

    #[test]
    fn test_copy_row_plain() {
        let line = format_copy_row(&row(vec![Some("1"), Some("alice")]));
        assert_eq!(line, "1\talice\n");
    }

    #[test]
    fn test_copy_row_null() {
        let line = format_copy_row(&row(vec![Some("1"), None, Some("")]));
        assert_eq!(line, "1\t\\N\t\n");
    }

    #[test]
    fn test_copy_row_escapes() {
        let line = format_copy_row(&row(vec![Some("a\tb"), Some("c\nd"), Some("e\\f")]));
        assert_eq!(line, "a\\tb\tc\\nd\te\\\\f\n");
    }

    #[test]
    fn test_copy_row_bytea_literal() {
        // Blob reformat output survives the escaping round trip: COPY
        // unescapes the doubled backslash back to \xdeadbeef.
        let line = format_copy_row(&row(vec![Some("\\xdeadbeef")]));
        assert_eq!(line, "\\\\xdeadbeef\n");
    }
}
