//! Row reading: turns one input file into a lazy sequence of raw rows.
//!
//! Three formats are supported:
//!
//! - `delimited` - CSV-style, quoted fields may embed separators and
//!   newlines (handled by the csv crate, so a logical row can span
//!   physical lines)
//! - `text` - plain separator-split lines; with `newline_escape` a
//!   trailing backslash continues the logical row on the next line
//! - `fixed` - fixed-width character columns
//!
//! The whole file is read and decoded up front with the configured
//! encoding (auto-detected via chardet when unset); a decode failure is
//! fatal for the section, since byte alignment cannot be trusted past
//! the first bad sequence. The file handle itself is opened and closed
//! inside [`RowReader::open`], so no handle outlives the reader on any
//! path.
//!
//! Offset handling (`fromcount` / `fromid`) and the `count` limit live
//! in the [`RowReader`] wrapper; positions keep counting skipped
//! records, so reject logs always reference absolute input record
//! numbers.

use std::io::Cursor;
use std::rc::Rc;

use crate::config::{Format, Section, StartOffset};
use crate::error::{ReadError, ReadResult};

/// One logical input record, possibly spanning several physical lines.
#[derive(Debug, Clone)]
pub struct RawRow {
    /// 1-based logical record number in the input file (header line
    /// excluded when `skip_first_line` is set).
    pub position: u64,

    /// Raw field values, split but not yet transformed.
    pub fields: Vec<String>,

    /// The record exactly as it appeared in the input, newlines
    /// included, for the reject data file.
    pub raw: String,
}

/// Lazy, finite, non-restartable sequence of [`RawRow`]s.
pub struct RowReader {
    inner: Box<dyn Iterator<Item = ReadResult<RawRow>>>,
    skip: SkipState,
    remaining: Option<u64>,
}

enum SkipState {
    None,
    Count(u64),
    UntilId(String),
}

impl RowReader {
    /// Open the section's input file and prepare iteration.
    pub fn open(section: &Section) -> ReadResult<Self> {
        let bytes = std::fs::read(&section.filename)?;
        let content = decode(&bytes, section)?;

        let inner: Box<dyn Iterator<Item = ReadResult<RawRow>>> = match section.format {
            Format::Delimited => Box::new(DelimitedRows::new(content, section)),
            Format::Text => Box::new(TextRows::new(content, section)),
            Format::Fixed => Box::new(FixedRows::new(content, section)),
        };

        let skip = match section.offset {
            StartOffset::Beginning => SkipState::None,
            StartOffset::Count(n) => SkipState::Count(n),
            StartOffset::Id(ref id) => SkipState::UntilId(id.clone()),
        };

        Ok(Self {
            inner,
            skip,
            remaining: section.count,
        })
    }
}

impl Iterator for RowReader {
    type Item = ReadResult<RawRow>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == Some(0) {
            return None;
        }

        loop {
            let row = match self.inner.next()? {
                Ok(row) => row,
                Err(e) => return Some(Err(e)),
            };

            match self.skip {
                SkipState::None => {}
                SkipState::Count(ref mut n) => {
                    if *n > 0 {
                        *n -= 1;
                        continue;
                    }
                }
                SkipState::UntilId(ref id) => {
                    // The matching record is the first one loaded.
                    if row.fields.first().map(String::as_str) != Some(id.as_str()) {
                        continue;
                    }
                    self.skip = SkipState::None;
                }
            }

            if let Some(ref mut remaining) = self.remaining {
                *remaining -= 1;
            }
            return Some(Ok(row));
        }
    }
}

/// Decode file bytes with the configured encoding, or auto-detect.
fn decode(bytes: &[u8], section: &Section) -> ReadResult<String> {
    let encoding = match section.encoding {
        Some(encoding) => encoding,
        None => detect_encoding(bytes),
    };

    let (content, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        return Err(ReadError::DecodeError {
            path: section.filename.display().to_string(),
            encoding: encoding.name().to_string(),
        });
    }
    Ok(content.into_owned())
}

/// Detect the encoding of raw bytes using chardet.
fn detect_encoding(bytes: &[u8]) -> &'static encoding_rs::Encoding {
    let (charset, _, _) = chardet::detect(bytes);
    encoding_rs::Encoding::for_label(charset.as_bytes()).unwrap_or(encoding_rs::UTF_8)
}

// =============================================================================
// Delimited (CSV)
// =============================================================================

struct DelimitedRows {
    content: Rc<[u8]>,
    reader: csv::Reader<Cursor<Rc<[u8]>>>,
    record: csv::StringRecord,
    position: u64,
}

impl DelimitedRows {
    fn new(content: String, section: &Section) -> Self {
        let content: Rc<[u8]> = Rc::from(content.into_bytes());
        let reader = csv::ReaderBuilder::new()
            .delimiter(section.field_sep as u8)
            .quote(section.quote as u8)
            .has_headers(section.skip_first_line)
            .flexible(true)
            .from_reader(Cursor::new(Rc::clone(&content)));

        Self {
            content,
            reader,
            record: csv::StringRecord::new(),
            position: 0,
        }
    }
}

impl Iterator for DelimitedRows {
    type Item = ReadResult<RawRow>;

    fn next(&mut self) -> Option<Self::Item> {
        let before = self.reader.position().byte() as usize;
        match self.reader.read_record(&mut self.record) {
            Ok(false) => None,
            Ok(true) => {
                let after = self.reader.position().byte() as usize;
                self.position += 1;

                // The slice is valid UTF-8: it came out of the decoder.
                let raw = String::from_utf8_lossy(&self.content[before..after])
                    .trim_end_matches(['\r', '\n'])
                    .to_string();

                Some(Ok(RawRow {
                    position: self.position,
                    fields: self.record.iter().map(str::to_string).collect(),
                    raw,
                }))
            }
            Err(e) => Some(Err(ReadError::CsvError(e))),
        }
    }
}

// =============================================================================
// Text (separator-split lines)
// =============================================================================

struct TextRows {
    lines: std::vec::IntoIter<String>,
    field_sep: char,
    trailing_sep: bool,
    newline_escape: bool,
    position: u64,
}

impl TextRows {
    fn new(content: String, section: &Section) -> Self {
        let mut lines: Vec<String> = content.lines().map(String::from).collect();
        if section.skip_first_line && !lines.is_empty() {
            lines.remove(0);
        }

        Self {
            lines: lines.into_iter(),
            field_sep: section.field_sep,
            trailing_sep: section.trailing_sep,
            newline_escape: section.newline_escape,
            position: 0,
        }
    }
}

impl Iterator for TextRows {
    type Item = ReadResult<RawRow>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let first = self.lines.next()?;
            if first.trim().is_empty() {
                continue;
            }

            let mut raw = first.clone();
            let mut logical = first;

            // An escaped newline continues the logical row; the raw
            // text keeps the escapes verbatim so rejects reload as-is.
            while self.newline_escape && logical.ends_with('\\') {
                let Some(next) = self.lines.next() else { break };
                logical.pop();
                logical.push('\n');
                logical.push_str(&next);
                raw.push('\n');
                raw.push_str(&next);
            }

            let mut fields: Vec<String> =
                logical.split(self.field_sep).map(String::from).collect();
            if self.trailing_sep && fields.last().is_some_and(|f| f.is_empty()) {
                fields.pop();
            }

            self.position += 1;
            return Some(Ok(RawRow {
                position: self.position,
                fields,
                raw,
            }));
        }
    }
}

// =============================================================================
// Fixed-width
// =============================================================================

struct FixedRows {
    lines: std::vec::IntoIter<String>,
    specs: Vec<(usize, usize)>,
    position: u64,
}

impl FixedRows {
    fn new(content: String, section: &Section) -> Self {
        let mut lines: Vec<String> = content.lines().map(String::from).collect();
        if section.skip_first_line && !lines.is_empty() {
            lines.remove(0);
        }

        let specs = section
            .columns
            .iter()
            .filter_map(|c| c.fixed.map(|f| (f.start, f.length)))
            .collect();

        Self {
            lines: lines.into_iter(),
            specs,
            position: 0,
        }
    }
}

impl Iterator for FixedRows {
    type Item = ReadResult<RawRow>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?;
            if line.trim().is_empty() {
                continue;
            }

            let chars: Vec<char> = line.chars().collect();
            let fields = self
                .specs
                .iter()
                .map(|&(start, length)| {
                    chars
                        .iter()
                        .skip(start)
                        .take(length)
                        .collect::<String>()
                })
                .collect();

            self.position += 1;
            return Some(Ok(RawRow {
                position: self.position,
                fields,
                raw: line,
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Overrides, Section};
    use std::io::Write;

    fn section_for(content: &[u8], yaml_opts: &str) -> (tempfile::TempDir, Section) {
        let dir = tempfile::tempdir().unwrap();
        let data_path = dir.path().join("input.dat");
        std::fs::File::create(&data_path)
            .unwrap()
            .write_all(content)
            .unwrap();

        let yaml = format!(
            r#"
sections:
  s:
    filename: {}
    table: t
{}
"#,
            data_path.display(),
            yaml_opts
        );
        let config = Config::from_str(&yaml).unwrap();
        let section = Section::resolve("s", &config, &Overrides::default()).unwrap();
        (dir, section)
    }

    fn rows(section: &Section) -> Vec<RawRow> {
        RowReader::open(section)
            .unwrap()
            .collect::<ReadResult<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_text_rows() {
        let (_dir, section) = section_for(
            b"1|alice|2024-01-01\n2|bob|2024-01-02\n",
            "    columns: [{ name: id }, { name: who }, { name: day }]\n",
        );
        let rows = rows(&section);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].fields, vec!["1", "alice", "2024-01-01"]);
        assert_eq!(rows[0].position, 1);
        assert_eq!(rows[1].raw, "2|bob|2024-01-02");
    }

    #[test]
    fn test_text_skips_blank_lines() {
        let (_dir, section) = section_for(
            b"1|a\n\n2|b\n",
            "    columns: [{ name: id }, { name: v }]\n",
        );
        assert_eq!(rows(&section).len(), 2);
    }

    #[test]
    fn test_text_trailing_sep() {
        let (_dir, section) = section_for(
            b"1|a|\n",
            "    trailing_sep: true\n    columns: [{ name: id }, { name: v }]\n",
        );
        let rows = rows(&section);
        assert_eq!(rows[0].fields, vec!["1", "a"]);
    }

    #[test]
    fn test_text_newline_escape() {
        let (_dir, section) = section_for(
            b"1|first\\\nsecond|x\n2|plain|y\n",
            "    newline_escape: true\n    columns: [{ name: id }, { name: v }, { name: w }]\n",
        );
        let rows = rows(&section);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].fields[1], "first\nsecond");
        // Raw keeps the escape so the reject file reloads unchanged.
        assert_eq!(rows[0].raw, "1|first\\\nsecond|x");
        assert_eq!(rows[0].position, 1);
        assert_eq!(rows[1].position, 2);
    }

    #[test]
    fn test_delimited_quoted_multiline() {
        let (_dir, section) = section_for(
            b"1,\"two\nlines\",3\n4,plain,6\n",
            "    format: delimited\n    field_sep: \",\"\n    columns: [{ name: a }, { name: b }, { name: c }]\n",
        );
        let rows = rows(&section);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].fields[1], "two\nlines");
        assert_eq!(rows[0].raw, "1,\"two\nlines\",3");
        assert_eq!(rows[1].fields, vec!["4", "plain", "6"]);
    }

    #[test]
    fn test_delimited_skip_first_line() {
        let (_dir, section) = section_for(
            b"a,b\n1,2\n",
            "    format: delimited\n    field_sep: \",\"\n    skip_first_line: true\n    columns: [{ name: a }, { name: b }]\n",
        );
        let rows = rows(&section);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].fields, vec!["1", "2"]);
        assert_eq!(rows[0].position, 1);
    }

    #[test]
    fn test_fixed_rows() {
        let (_dir, section) = section_for(
            b"001alice   x\n002bob     y\n",
            "    format: fixed\n    columns: [{ name: id, start: 0, length: 3 }, { name: who, start: 3, length: 8 }, { name: flag, start: 11, length: 1 }]\n",
        );
        let rows = rows(&section);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].fields, vec!["001", "alice   ", "x"]);
        assert_eq!(rows[1].fields[2], "y");
    }

    #[test]
    fn test_fromcount_skips_records() {
        let (_dir, section) = section_for(
            b"1|a\n2|b\n3|c\n",
            "    fromcount: 2\n    columns: [{ name: id }, { name: v }]\n",
        );
        let rows = rows(&section);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].fields[0], "3");
        // Positions are absolute input record numbers.
        assert_eq!(rows[0].position, 3);
    }

    #[test]
    fn test_fromid_starts_at_matching_record() {
        let (_dir, section) = section_for(
            b"1|a\n2|b\n3|c\n",
            "    fromid: \"2\"\n    columns: [{ name: id }, { name: v }]\n",
        );
        let rows = rows(&section);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].fields[0], "2");
        assert_eq!(rows[1].fields[0], "3");
    }

    #[test]
    fn test_count_limits_records() {
        let (_dir, section) = section_for(
            b"1|a\n2|b\n3|c\n",
            "    count: 2\n    columns: [{ name: id }, { name: v }]\n",
        );
        assert_eq!(rows(&section).len(), 2);
    }

    #[test]
    fn test_latin1_decoding() {
        // "Soci<e-acute>t<e-acute>" in ISO-8859-1
        let bytes: &[u8] = b"1|Soci\xe9t\xe9\n";
        let (_dir, section) = section_for(
            bytes,
            "    encoding: iso-8859-1\n    columns: [{ name: id }, { name: who }]\n",
        );
        let rows = rows(&section);
        assert_eq!(rows[0].fields[1], "Soci\u{e9}t\u{e9}");
    }

    #[test]
    fn test_decode_failure_is_fatal() {
        // 0xff 0xfe is not valid UTF-8.
        let bytes: &[u8] = b"1|\xff\xfe\n";
        let (_dir, section) = section_for(
            bytes,
            "    encoding: utf-8\n    columns: [{ name: id }, { name: v }]\n",
        );
        let result: ReadResult<Vec<_>> = RowReader::open(&section).and_then(|r| r.collect());
        assert!(matches!(result, Err(ReadError::DecodeError { .. })));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let yaml = r#"
sections:
  s:
    filename: /nonexistent/input.dat
    table: t
    columns: [{ name: a }]
"#;
        let config = Config::from_str(yaml).unwrap();
        let section = Section::resolve("s", &config, &Overrides::default()).unwrap();
        assert!(matches!(
            RowReader::open(&section),
            Err(ReadError::IoError(_))
        ));
    }
}
