//! Field reformatting: named, pure per-column transforms.
//!
//! Columns select rules by name in the configuration (`reformat: date`).
//! Lookup happens once, at section resolution, so an unknown rule name
//! fails before any row is processed. Application is a pure function of
//! the raw value: `Ok(None)` means SQL NULL, `Ok(Some(s))` is the
//! transformed value, `Err` rejects the row.
//!
//! Idempotency per rule (re-applying to an already-transformed value):
//!
//! - `date`, `timestamp`, `number`, `strip` are idempotent: normalized
//!   output parses back to itself.
//! - `clob`, `blob` are *not* idempotent: they replace a side-file path
//!   with its contents, and re-application fails deterministically
//!   (the contents are not a readable path). The engine applies each
//!   rule exactly once per value.

use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::Column;
use crate::error::{ReformatError, ReformatResult};

/// Available rules, as `(name, description)`, for `--help`-style output
/// and error messages.
pub const RULES: &[(&str, &str)] = &[
    ("date", "normalize to YYYY-MM-DD; zero dates become NULL"),
    (
        "timestamp",
        "normalize to YYYY-MM-DD HH:MM:SS; zero timestamps become NULL",
    ),
    ("number", "numeric coercion: strip group separators, ',' to '.'"),
    (
        "strip",
        "remove trailing characters; 'strip' trims whitespace, 'strip:/' trims '/'",
    ),
    ("clob", "replace a side-file path with its text contents"),
    ("blob", "replace a side-file path with its contents as hex bytea"),
];

static ZERO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^0{4}[-/]?0{2}[-/]?0{2}([ T]0{2}:?0{2}:?0{2})?$").unwrap());

/// A resolved per-column transform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReformatRule {
    /// Normalize dates to `YYYY-MM-DD`.
    Date,

    /// Normalize timestamps to `YYYY-MM-DD HH:MM:SS`.
    Timestamp,

    /// Coerce numeric strings: drop spaces and group separators, turn a
    /// decimal comma into a dot, and verify the result parses.
    Number,

    /// Remove trailing characters from the given set.
    Strip { chars: String },

    /// Dereference a side file into its text contents.
    Clob,

    /// Dereference a side file into a hex-escaped bytea literal.
    Blob,
}

/// Context handed to rule application: the column being transformed and
/// the directory side files are resolved against.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub column: &'a str,
    pub blob_dir: &'a Path,
}

impl ReformatRule {
    /// Look up a rule by its configuration name.
    ///
    /// `strip` accepts an argument after a colon (`strip:/`). Returns
    /// `None` for unknown names; the caller turns that into a
    /// configuration error naming section and column.
    pub fn from_name(name: &str) -> Option<Self> {
        let (base, arg) = match name.split_once(':') {
            Some((base, arg)) => (base, Some(arg)),
            None => (name, None),
        };

        match (base, arg) {
            ("date", None) => Some(ReformatRule::Date),
            ("timestamp", None) => Some(ReformatRule::Timestamp),
            ("number", None) => Some(ReformatRule::Number),
            ("strip", None) => Some(ReformatRule::Strip {
                chars: String::new(),
            }),
            ("strip", Some(chars)) if !chars.is_empty() => Some(ReformatRule::Strip {
                chars: chars.to_string(),
            }),
            ("clob", None) => Some(ReformatRule::Clob),
            ("blob", None) => Some(ReformatRule::Blob),
            _ => None,
        }
    }

    /// Apply this rule to a raw value.
    pub fn apply(&self, value: &str, ctx: &RuleContext) -> ReformatResult<Option<String>> {
        match self {
            ReformatRule::Date => self.apply_date(value, ctx),
            ReformatRule::Timestamp => self.apply_timestamp(value, ctx),
            ReformatRule::Number => self.apply_number(value, ctx),
            ReformatRule::Strip { chars } => Ok(Some(apply_strip(value, chars))),
            ReformatRule::Clob => self.apply_clob(value, ctx),
            ReformatRule::Blob => self.apply_blob(value, ctx),
        }
    }

    fn apply_date(&self, value: &str, ctx: &RuleContext) -> ReformatResult<Option<String>> {
        let value = value.trim();
        if value.is_empty() || ZERO_DATE.is_match(value) {
            return Ok(None);
        }

        for format in ["%Y-%m-%d", "%Y%m%d", "%d/%m/%Y"] {
            if let Ok(date) = NaiveDate::parse_from_str(value, format) {
                return Ok(Some(date.format("%Y-%m-%d").to_string()));
            }
        }

        Err(fail(ctx, value, "not a recognized date"))
    }

    fn apply_timestamp(&self, value: &str, ctx: &RuleContext) -> ReformatResult<Option<String>> {
        let value = value.trim();
        if value.is_empty() || ZERO_DATE.is_match(value) {
            return Ok(None);
        }

        for format in [
            "%Y-%m-%d %H:%M:%S",
            "%Y-%m-%dT%H:%M:%S",
            "%Y%m%d%H%M%S",
        ] {
            if let Ok(ts) = NaiveDateTime::parse_from_str(value, format) {
                return Ok(Some(ts.format("%Y-%m-%d %H:%M:%S").to_string()));
            }
        }

        // A bare date is accepted and given a midnight time part.
        if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
            if let Some(ts) = date.and_hms_opt(0, 0, 0) {
                return Ok(Some(ts.format("%Y-%m-%d %H:%M:%S").to_string()));
            }
        }

        Err(fail(ctx, value, "not a recognized timestamp"))
    }

    fn apply_number(&self, value: &str, ctx: &RuleContext) -> ReformatResult<Option<String>> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let mut normalized: String = trimmed
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_')
            .collect();

        // European decimal comma, only when no dot competes with it.
        if normalized.contains(',') {
            if normalized.contains('.') {
                normalized.retain(|c| c != ',');
            } else {
                normalized = normalized.replace(',', ".");
            }
        }

        if normalized.parse::<f64>().is_err() {
            return Err(fail(ctx, value, "not a number"));
        }

        Ok(Some(normalized))
    }

    fn apply_clob(&self, value: &str, ctx: &RuleContext) -> ReformatResult<Option<String>> {
        let value = value.trim();
        if value.is_empty() {
            return Ok(None);
        }

        let path = ctx.blob_dir.join(value);
        let bytes = std::fs::read(&path)
            .map_err(|e| fail(ctx, value, format!("cannot read clob file: {e}")))?;
        String::from_utf8(bytes)
            .map(Some)
            .map_err(|_| fail(ctx, value, "clob file is not valid UTF-8"))
    }

    fn apply_blob(&self, value: &str, ctx: &RuleContext) -> ReformatResult<Option<String>> {
        let value = value.trim();
        if value.is_empty() {
            return Ok(None);
        }

        let path = ctx.blob_dir.join(value);
        let bytes = std::fs::read(&path)
            .map_err(|e| fail(ctx, value, format!("cannot read blob file: {e}")))?;

        let mut literal = String::with_capacity(2 + bytes.len() * 2);
        literal.push_str("\\x");
        for byte in bytes {
            literal.push_str(&format!("{byte:02x}"));
        }
        Ok(Some(literal))
    }
}

fn apply_strip(value: &str, chars: &str) -> String {
    if chars.is_empty() {
        value.trim_end().to_string()
    } else {
        value.trim_end_matches(|c| chars.contains(c)).to_string()
    }
}

fn fail(ctx: &RuleContext, value: &str, message: impl Into<String>) -> ReformatError {
    ReformatError::new(ctx.column, value, message)
}

/// Transform one raw field: sentinel substitution first, then the
/// column's rule (if any).
///
/// `Ok(None)` loads as SQL NULL.
pub fn transform_field(
    column: &Column,
    raw: &str,
    null_sentinel: &str,
    empty_string: &str,
    blob_dir: &Path,
) -> ReformatResult<Option<String>> {
    if raw == null_sentinel {
        return Ok(None);
    }
    if raw == empty_string {
        return Ok(Some(String::new()));
    }

    match column.rule {
        Some(ref rule) => {
            let ctx = RuleContext {
                column: &column.name,
                blob_dir,
            };
            rule.apply(raw, &ctx)
        }
        None => Ok(Some(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>(blob_dir: &'a Path) -> RuleContext<'a> {
        RuleContext {
            column: "c",
            blob_dir,
        }
    }

    fn apply(rule: &ReformatRule, value: &str) -> ReformatResult<Option<String>> {
        rule.apply(value, &ctx(Path::new(".")))
    }

    #[test]
    fn test_rule_lookup() {
        assert_eq!(ReformatRule::from_name("date"), Some(ReformatRule::Date));
        assert_eq!(
            ReformatRule::from_name("strip:/"),
            Some(ReformatRule::Strip {
                chars: "/".to_string()
            })
        );
        assert_eq!(ReformatRule::from_name("frobnicate"), None);
        assert_eq!(ReformatRule::from_name("date:x"), None);
    }

    #[test]
    fn test_date_normalization() {
        let rule = ReformatRule::Date;
        assert_eq!(apply(&rule, "2024-03-01").unwrap().unwrap(), "2024-03-01");
        assert_eq!(apply(&rule, "20240301").unwrap().unwrap(), "2024-03-01");
        assert_eq!(apply(&rule, "01/03/2024").unwrap().unwrap(), "2024-03-01");
    }

    #[test]
    fn test_zero_date_becomes_null() {
        let rule = ReformatRule::Date;
        assert_eq!(apply(&rule, "0000-00-00").unwrap(), None);
        assert_eq!(apply(&rule, "00000000").unwrap(), None);
        assert_eq!(apply(&rule, "").unwrap(), None);

        let ts = ReformatRule::Timestamp;
        assert_eq!(apply(&ts, "0000-00-00 00:00:00").unwrap(), None);
    }

    #[test]
    fn test_bad_date_rejected() {
        let rule = ReformatRule::Date;
        let err = apply(&rule, "not-a-date").unwrap_err();
        assert!(err.message.contains("date"));
        assert_eq!(err.value, "not-a-date");
    }

    #[test]
    fn test_date_idempotent() {
        let rule = ReformatRule::Date;
        let once = apply(&rule, "01/03/2024").unwrap().unwrap();
        let twice = apply(&rule, &once).unwrap().unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_timestamp_normalization() {
        let rule = ReformatRule::Timestamp;
        assert_eq!(
            apply(&rule, "20240301123000").unwrap().unwrap(),
            "2024-03-01 12:30:00"
        );
        assert_eq!(
            apply(&rule, "2024-03-01T12:30:00").unwrap().unwrap(),
            "2024-03-01 12:30:00"
        );
        assert_eq!(
            apply(&rule, "2024-03-01").unwrap().unwrap(),
            "2024-03-01 00:00:00"
        );
    }

    #[test]
    fn test_number_coercion() {
        let rule = ReformatRule::Number;
        assert_eq!(apply(&rule, "1 234,56").unwrap().unwrap(), "1234.56");
        assert_eq!(apply(&rule, "1,234.56").unwrap().unwrap(), "1234.56");
        assert_eq!(apply(&rule, "-42").unwrap().unwrap(), "-42");
        assert!(apply(&rule, "12f").is_err());
    }

    #[test]
    fn test_number_idempotent() {
        let rule = ReformatRule::Number;
        let once = apply(&rule, "1 234,56").unwrap().unwrap();
        assert_eq!(apply(&rule, &once).unwrap().unwrap(), once);
    }

    #[test]
    fn test_strip_trailing() {
        let default = ReformatRule::from_name("strip").unwrap();
        assert_eq!(apply(&default, "abc   ").unwrap().unwrap(), "abc");

        let slashes = ReformatRule::from_name("strip:/").unwrap();
        assert_eq!(apply(&slashes, "path//").unwrap().unwrap(), "path");
        assert_eq!(apply(&slashes, "path").unwrap().unwrap(), "path");
    }

    #[test]
    fn test_clob_dereference() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("note.txt"), "long text here").unwrap();

        let rule = ReformatRule::Clob;
        let result = rule.apply("note.txt", &ctx(dir.path())).unwrap();
        assert_eq!(result.unwrap(), "long text here");
    }

    #[test]
    fn test_blob_dereference_hex() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("img.bin"), [0xde, 0xad, 0xbe, 0xef]).unwrap();

        let rule = ReformatRule::Blob;
        let result = rule.apply("img.bin", &ctx(dir.path())).unwrap();
        assert_eq!(result.unwrap(), "\\xdeadbeef");
    }

    #[test]
    fn test_blob_missing_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let rule = ReformatRule::Blob;
        assert!(rule.apply("missing.bin", &ctx(dir.path())).is_err());
    }

    #[test]
    fn test_sentinel_substitution() {
        let column = Column {
            name: "c".to_string(),
            rule: None,
            fixed: None,
        };
        let blob_dir = Path::new(".");

        assert_eq!(
            transform_field(&column, "\\NA", "\\NA", "\\NULL\\", blob_dir).unwrap(),
            None
        );
        assert_eq!(
            transform_field(&column, "\\NULL\\", "\\NA", "\\NULL\\", blob_dir).unwrap(),
            Some(String::new())
        );
        assert_eq!(
            transform_field(&column, "plain", "\\NA", "\\NULL\\", blob_dir).unwrap(),
            Some("plain".to_string())
        );
    }

    #[test]
    fn test_sentinel_checked_before_rule() {
        let column = Column {
            name: "c".to_string(),
            rule: Some(ReformatRule::Date),
            fixed: None,
        };
        // The sentinel is not a valid date; it must not reach the rule.
        let result = transform_field(&column, "\\NA", "\\NA", "\\NULL\\", Path::new("."));
        assert_eq!(result.unwrap(), None);
    }
}
