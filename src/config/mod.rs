//! Configuration: database connection, global defaults, and per-section
//! import definitions.
//!
//! The configuration file is YAML with three top-level blocks:
//!
//! ```yaml
//! database:
//!   host: localhost
//!   port: 5432
//!   dbname: target
//!   user: loader
//!
//! defaults:
//!   null: "\\NA"
//!   empty_string: "\\NULL\\"
//!   copy_every: 1000
//!   commit_every: 10000
//!   reject_dir: rejects
//!
//! sections:
//!   orders:
//!     filename: data/orders.txt
//!     table: orders
//!     format: text
//!     field_sep: "|"
//!     columns:
//!       - { name: id }
//!       - { name: placed_on, reformat: date }
//!       - { name: amount, reformat: number }
//! ```
//!
//! A section marked `template: true` is never executed; other sections
//! may name it in `use_template` and inherit any option they do not set
//! themselves. All validation happens in [`Section::resolve`], before a
//! single row is read: unknown reformat rules, unknown encodings, and
//! the `fromcount`/`fromid` exclusivity are all construction-time
//! errors.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use encoding_rs::Encoding;
use serde::Deserialize;

use crate::error::{ConfigError, ConfigResult};
use crate::reformat::ReformatRule;

/// Default null sentinel, as found in Informix UNLOAD exports.
pub const DEFAULT_NULL: &str = "\\NA";

/// Default empty-string sentinel.
pub const DEFAULT_EMPTY_STRING: &str = "\\NULL\\";

const DEFAULT_COPY_EVERY: usize = 1000;
const DEFAULT_COMMIT_EVERY: usize = 10000;
const DEFAULT_FIELD_SEP: char = '|';
const DEFAULT_QUOTE: char = '"';

// =============================================================================
// Raw (serde) configuration
// =============================================================================

/// Whole configuration file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub sections: BTreeMap<String, SectionConfig>,
}

/// Target database connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_dbname")]
    pub dbname: String,

    #[serde(default = "default_user")]
    pub user: String,

    /// Password; falls back to the `COPYLOAD_PASSWORD` environment
    /// variable when unset.
    pub password: Option<String>,

    /// `SET client_encoding` value applied at connection time.
    pub client_encoding: Option<String>,

    /// `SET datestyle` value applied at connection time.
    pub datestyle: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            dbname: default_dbname(),
            user: default_user(),
            password: None,
            client_encoding: None,
            datestyle: None,
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_dbname() -> String {
    "postgres".to_string()
}

fn default_user() -> String {
    "postgres".to_string()
}

/// Global defaults, overridable per section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    /// Input token loaded as SQL NULL.
    #[serde(rename = "null")]
    pub null_sentinel: Option<String>,

    /// Input token loaded as the empty string.
    pub empty_string: Option<String>,

    pub copy_every: Option<usize>,
    pub commit_every: Option<usize>,

    /// Input encoding label; omitted means auto-detection per file.
    pub encoding: Option<String>,

    /// Directory receiving `<section>.rej` / `<section>.rej.log` files.
    pub reject_dir: Option<PathBuf>,
}

/// One named import unit, as written in the configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SectionConfig {
    pub filename: Option<PathBuf>,
    pub table: Option<String>,

    /// Templates hold shared options and are never executed.
    #[serde(default)]
    pub template: bool,

    /// Name of a template section to inherit unset options from.
    pub use_template: Option<String>,

    pub format: Option<Format>,
    pub field_sep: Option<char>,
    pub quote: Option<char>,

    #[serde(default)]
    pub columns: Vec<ColumnConfig>,

    #[serde(rename = "null")]
    pub null_sentinel: Option<String>,
    pub empty_string: Option<String>,

    pub copy_every: Option<usize>,
    pub commit_every: Option<usize>,

    /// Skip this many input records before loading.
    pub fromcount: Option<u64>,

    /// Skip input records until the first column equals this value;
    /// that record is the first one loaded. Mutually exclusive with
    /// `fromcount`.
    pub fromid: Option<String>,

    /// Stop after this many records.
    pub count: Option<u64>,

    pub encoding: Option<String>,

    /// Ignore the first input line (header line).
    pub skip_first_line: Option<bool>,

    /// Drop the trailing field separator ending each record
    /// (Informix UNLOAD convention).
    pub trailing_sep: Option<bool>,

    /// Text format: a backslash ending a physical line escapes the
    /// newline, continuing the logical row.
    pub newline_escape: Option<bool>,
}

/// Input file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// CSV-style: quoted fields, embedded separators and newlines.
    Delimited,
    /// Plain separator-split lines, optional newline escapes.
    Text,
    /// Fixed-width character columns.
    Fixed,
}

/// One column definition.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnConfig {
    pub name: String,

    /// Named reformat rule, e.g. `date`, `number`, `strip:/`, `clob`.
    pub reformat: Option<String>,

    /// Fixed format: first character of the field (0-based).
    pub start: Option<usize>,

    /// Fixed format: field width in characters.
    pub length: Option<usize>,
}

impl Config {
    /// Load and parse a configuration file.
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse configuration from a YAML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> ConfigResult<Self> {
        let config: Config = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// All section names, sorted. Includes templates; the caller skips
    /// them via [`Section::template`] after resolution.
    pub fn section_names(&self) -> Vec<String> {
        self.sections.keys().cloned().collect()
    }
}

// =============================================================================
// Resolved section
// =============================================================================

/// Where to start reading in the input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOffset {
    Beginning,
    /// Skip this many records.
    Count(u64),
    /// Skip until a record whose first column equals this id.
    Id(String),
}

/// A column with its reformat rule resolved.
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub rule: Option<ReformatRule>,
    /// Fixed format slice, absent for delimited/text.
    pub fixed: Option<FixedSpec>,
}

/// Character slice of a fixed-width column.
#[derive(Debug, Clone, Copy)]
pub struct FixedSpec {
    pub start: usize,
    pub length: usize,
}

/// Command-line overrides applied on top of every selected section.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub count: Option<u64>,
    pub fromcount: Option<u64>,
    pub fromid: Option<String>,
    pub encoding: Option<String>,
}

/// A fully resolved, validated section: defaults, template inheritance
/// and command-line overrides merged, rules and encodings looked up.
///
/// Immutable for the duration of the load.
#[derive(Debug, Clone)]
pub struct Section {
    pub name: String,
    pub template: bool,
    pub filename: PathBuf,
    pub table: String,
    pub format: Format,
    pub field_sep: char,
    pub quote: char,
    pub columns: Vec<Column>,
    pub null_sentinel: String,
    pub empty_string: String,
    pub copy_every: usize,
    pub commit_every: usize,
    pub offset: StartOffset,
    pub count: Option<u64>,
    /// `None` means auto-detect from file content.
    pub encoding: Option<&'static Encoding>,
    pub skip_first_line: bool,
    pub trailing_sep: bool,
    pub newline_escape: bool,
    /// Directory side files (blob/clob) are resolved against.
    pub blob_dir: PathBuf,
    pub reject_dir: PathBuf,
}

impl Section {
    /// Resolve and validate one named section.
    ///
    /// Every configuration problem is reported here, before any row is
    /// read: missing attributes, unknown rules, unknown encodings, and
    /// the `fromcount`/`fromid` exclusivity.
    pub fn resolve(name: &str, config: &Config, overrides: &Overrides) -> ConfigResult<Self> {
        let raw = config
            .sections
            .get(name)
            .ok_or_else(|| ConfigError::NoSuchSection(name.to_string()))?;

        // Merge: section value, else template value, else global default.
        let mut merged = raw.clone();
        if let Some(ref template_name) = raw.use_template {
            let template = config.sections.get(template_name).ok_or_else(|| {
                ConfigError::UnknownTemplate {
                    section: name.to_string(),
                    template: template_name.clone(),
                }
            })?;
            merged = merge_section(raw, template);
        }

        if merged.template {
            // Templates carry options for other sections; nothing else
            // to validate, and they are never run.
            return Ok(Section {
                name: name.to_string(),
                template: true,
                filename: PathBuf::new(),
                table: String::new(),
                format: Format::Text,
                field_sep: DEFAULT_FIELD_SEP,
                quote: DEFAULT_QUOTE,
                columns: Vec::new(),
                null_sentinel: DEFAULT_NULL.to_string(),
                empty_string: DEFAULT_EMPTY_STRING.to_string(),
                copy_every: DEFAULT_COPY_EVERY,
                commit_every: DEFAULT_COMMIT_EVERY,
                offset: StartOffset::Beginning,
                count: None,
                encoding: None,
                skip_first_line: false,
                trailing_sep: false,
                newline_escape: false,
                blob_dir: PathBuf::new(),
                reject_dir: PathBuf::from("."),
            });
        }

        let filename = merged
            .filename
            .clone()
            .ok_or_else(|| missing(name, "filename"))?;
        let table = merged.table.clone().ok_or_else(|| missing(name, "table"))?;

        if merged.columns.is_empty() {
            return Err(missing(name, "columns"));
        }

        let fromcount = overrides.fromcount.or(merged.fromcount);
        let fromid = overrides.fromid.clone().or_else(|| merged.fromid.clone());
        let offset = match (fromcount, fromid) {
            (Some(_), Some(_)) => return Err(ConfigError::ExclusiveOffsets(name.to_string())),
            (Some(0), None) | (None, None) => StartOffset::Beginning,
            (Some(n), None) => StartOffset::Count(n),
            (None, Some(id)) => StartOffset::Id(id),
        };

        let format = merged.format.unwrap_or(Format::Text);

        let columns = merged
            .columns
            .iter()
            .map(|col| resolve_column(name, col, format))
            .collect::<ConfigResult<Vec<Column>>>()?;

        let encoding_label = overrides
            .encoding
            .clone()
            .or_else(|| merged.encoding.clone())
            .or_else(|| config.defaults.encoding.clone());
        let encoding = match encoding_label {
            Some(label) => Some(Encoding::for_label(label.as_bytes()).ok_or_else(|| {
                ConfigError::UnknownEncoding {
                    section: name.to_string(),
                    encoding: label,
                }
            })?),
            None => None,
        };

        let copy_every = merged
            .copy_every
            .or(config.defaults.copy_every)
            .unwrap_or(DEFAULT_COPY_EVERY);
        if copy_every == 0 {
            return Err(ConfigError::InvalidOption {
                section: name.to_string(),
                option: "copy_every".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        let commit_every = merged
            .commit_every
            .or(config.defaults.commit_every)
            .unwrap_or(DEFAULT_COMMIT_EVERY);

        let blob_dir = filename
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Section {
            name: name.to_string(),
            template: false,
            filename,
            table,
            format,
            field_sep: merged.field_sep.unwrap_or(DEFAULT_FIELD_SEP),
            quote: merged.quote.unwrap_or(DEFAULT_QUOTE),
            columns,
            null_sentinel: merged
                .null_sentinel
                .clone()
                .or_else(|| config.defaults.null_sentinel.clone())
                .unwrap_or_else(|| DEFAULT_NULL.to_string()),
            empty_string: merged
                .empty_string
                .clone()
                .or_else(|| config.defaults.empty_string.clone())
                .unwrap_or_else(|| DEFAULT_EMPTY_STRING.to_string()),
            copy_every,
            commit_every,
            offset,
            count: overrides.count.or(merged.count),
            encoding,
            skip_first_line: merged.skip_first_line.unwrap_or(false),
            trailing_sep: merged.trailing_sep.unwrap_or(false),
            newline_escape: merged.newline_escape.unwrap_or(false),
            blob_dir,
            reject_dir: config
                .defaults
                .reject_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(".")),
        })
    }

    /// Column names, in declaration order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

fn missing(section: &str, option: &str) -> ConfigError {
    ConfigError::MissingOption {
        section: section.to_string(),
        option: option.to_string(),
    }
}

fn resolve_column(section: &str, col: &ColumnConfig, format: Format) -> ConfigResult<Column> {
    let rule = match col.reformat {
        Some(ref rule_name) => {
            Some(
                ReformatRule::from_name(rule_name).ok_or_else(|| ConfigError::UnknownRule {
                    section: section.to_string(),
                    column: col.name.clone(),
                    rule: rule_name.clone(),
                })?,
            )
        }
        None => None,
    };

    let fixed = if format == Format::Fixed {
        let start = col.start.ok_or_else(|| ConfigError::InvalidOption {
            section: section.to_string(),
            option: "columns".to_string(),
            message: format!("fixed format column '{}' needs 'start'", col.name),
        })?;
        let length = col.length.ok_or_else(|| ConfigError::InvalidOption {
            section: section.to_string(),
            option: "columns".to_string(),
            message: format!("fixed format column '{}' needs 'length'", col.name),
        })?;
        Some(FixedSpec { start, length })
    } else {
        None
    };

    Ok(Column {
        name: col.name.clone(),
        rule,
        fixed,
    })
}

/// Section-over-template merge: the section wins wherever it sets a
/// value. Lists (columns) are taken wholesale from whichever side has
/// them, section first.
fn merge_section(section: &SectionConfig, template: &SectionConfig) -> SectionConfig {
    SectionConfig {
        filename: section.filename.clone().or_else(|| template.filename.clone()),
        table: section.table.clone().or_else(|| template.table.clone()),
        template: section.template,
        use_template: None,
        format: section.format.or(template.format),
        field_sep: section.field_sep.or(template.field_sep),
        quote: section.quote.or(template.quote),
        columns: if section.columns.is_empty() {
            template.columns.clone()
        } else {
            section.columns.clone()
        },
        null_sentinel: section
            .null_sentinel
            .clone()
            .or_else(|| template.null_sentinel.clone()),
        empty_string: section
            .empty_string
            .clone()
            .or_else(|| template.empty_string.clone()),
        copy_every: section.copy_every.or(template.copy_every),
        commit_every: section.commit_every.or(template.commit_every),
        fromcount: section.fromcount.or(template.fromcount),
        fromid: section.fromid.clone().or_else(|| template.fromid.clone()),
        count: section.count.or(template.count),
        encoding: section.encoding.clone().or_else(|| template.encoding.clone()),
        skip_first_line: section.skip_first_line.or(template.skip_first_line),
        trailing_sep: section.trailing_sep.or(template.trailing_sep),
        newline_escape: section.newline_escape.or(template.newline_escape),
    }
}
