//! Error types for the copyload engine.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`ConfigError`] - configuration parsing and validation errors
//! - [`ReadError`] - input file reading and decoding errors
//! - [`ReformatError`] - per-column value transformation failures
//! - [`StoreError`] - target store errors, split by recoverability
//! - [`LoadError`] - top-level section loading errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.
//!
//! [`StoreError`] deliberately has exactly two variants: `Data` (the
//! store refused the rows — recoverable by bisection) and `Connection`
//! (the store itself is gone — fatal). The recovery code branches on
//! the variant, never on message text.

use thiserror::Error;

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors raised while parsing or validating configuration.
///
/// All of these are fatal at section construction time; no row is ever
/// read from a section whose configuration did not validate.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("Cannot read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    /// The configuration file is not valid YAML.
    #[error("Invalid configuration: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// A required section attribute is missing.
    #[error("Section '{section}': missing required option '{option}'")]
    MissingOption { section: String, option: String },

    /// A section attribute has an invalid value.
    #[error("Section '{section}': invalid value for '{option}': {message}")]
    InvalidOption {
        section: String,
        option: String,
        message: String,
    },

    /// Both `fromcount` and `fromid` were set on one section.
    #[error("Section '{0}': 'fromcount' and 'fromid' are mutually exclusive")]
    ExclusiveOffsets(String),

    /// A column names a reformat rule that is not registered.
    #[error("Section '{section}', column '{column}': unknown reformat rule '{rule}'")]
    UnknownRule {
        section: String,
        column: String,
        rule: String,
    },

    /// The configured input encoding is not a known encoding label.
    #[error("Section '{section}': unknown encoding '{encoding}'")]
    UnknownEncoding { section: String, encoding: String },

    /// A section inherits from a template that does not exist.
    #[error("Section '{section}': unknown template '{template}'")]
    UnknownTemplate { section: String, template: String },

    /// The named section does not exist in the configuration.
    #[error("No such section: '{0}'")]
    NoSuchSection(String),
}

// =============================================================================
// Input Reading Errors
// =============================================================================

/// Errors while reading rows from an input file.
#[derive(Debug, Error)]
pub enum ReadError {
    /// Failed to open or read the input file.
    #[error("Cannot read input file: {0}")]
    IoError(#[from] std::io::Error),

    /// The delimited parser hit an unrecoverable record error, e.g. an
    /// unterminated quote: past it, record boundaries cannot be trusted.
    #[error("Malformed delimited input: {0}")]
    CsvError(#[from] csv::Error),

    /// The file bytes do not match the declared encoding.
    ///
    /// Fatal for the whole section: once decoding fails, byte alignment
    /// is lost and no further row boundary can be trusted.
    #[error("Cannot decode '{path}' with encoding '{encoding}'")]
    DecodeError { path: String, encoding: String },
}

// =============================================================================
// Reformat Errors
// =============================================================================

/// A per-column transform failed on a specific value.
///
/// Carries the offending column and value so the reject log can record
/// exactly what was refused and why.
#[derive(Debug, Clone, Error)]
#[error("column '{column}' (value '{value}'): {message}")]
pub struct ReformatError {
    pub column: String,
    pub value: String,
    pub message: String,
}

impl ReformatError {
    pub fn new(
        column: impl Into<String>,
        value: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
            message: message.into(),
        }
    }
}

// =============================================================================
// Store Errors
// =============================================================================

/// Errors reported by the target store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The store rejected the submitted rows.
    ///
    /// Recoverable: the batch is bisected until the offending rows are
    /// isolated and reject-logged.
    #[error("Store rejected data: {0}")]
    Data(String),

    /// The store is unreachable or the connection dropped.
    ///
    /// Never recoverable by retrying rows.
    #[error("Store connection error: {0}")]
    Connection(String),
}

impl StoreError {
    /// True when the error concerns the submitted data rather than the
    /// connection, i.e. when bisection recovery applies.
    pub fn is_data(&self) -> bool {
        matches!(self, StoreError::Data(_))
    }
}

// =============================================================================
// Load Errors (top-level)
// =============================================================================

/// Top-level errors surfaced by [`crate::loader::SectionLoader::run`].
///
/// Data rejects never appear here: they are resolved by bisection,
/// logged, and counted inside the engine. Everything in this enum is a
/// section-fatal condition.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Input reading or decoding error.
    #[error("Read error: {0}")]
    Read(#[from] ReadError),

    /// A store operation failed outside batch recovery.
    ///
    /// Batch-level `Data` errors are consumed by the bisector and never
    /// reach this variant; what remains is connection loss or an error
    /// on a transaction operation (begin/commit/rollback/truncate).
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Failed to write a reject record.
    ///
    /// Rejects must never be silently dropped, so a reject log write
    /// failure aborts the section.
    #[error("Cannot write reject log: {0}")]
    RejectLog(std::io::Error),

    /// The load was cancelled by an external interrupt.
    ///
    /// A controlled early stop: the summary reflects work done so far
    /// and no transaction is left open.
    #[error("Interrupted")]
    Interrupted,
}

impl LoadError {
    /// True when the failure indicates the store itself is unusable,
    /// in which case the driver should abort the remaining sections
    /// rather than retry per-section.
    pub fn is_connection(&self) -> bool {
        matches!(self, LoadError::Store(StoreError::Connection(_)))
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for input reading operations.
pub type ReadResult<T> = Result<T, ReadError>;

/// Result type for reformat operations.
pub type ReformatResult<T> = Result<T, ReformatError>;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for section loading operations.
pub type LoadResult<T> = Result<T, LoadError>;
