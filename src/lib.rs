//! # copyload - bulk data loading for PostgreSQL
//!
//! copyload reads delimited, text, or fixed-width files and loads them
//! into PostgreSQL through COPY, in bounded batches, without letting
//! malformed rows abort the run.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐    ┌────────────┐    ┌────────────┐    ┌────────────┐
//! │ Input file │───▶│ Row Reader │───▶│  Reformat  │───▶│  Batches   │
//! │ (any enc.) │    │ (fmt+offs) │    │ (per col)  │    │ (COPY/tx)  │
//! └────────────┘    └────────────┘    └────────────┘    └─────┬──────┘
//!                                                             │ refused?
//!                                                      ┌──────▼──────┐
//!                                                      │  Bisection  │
//!                                                      │ + rejects   │
//!                                                      └─────────────┘
//! ```
//!
//! A refused batch is split in half and resubmitted until the bad rows
//! are isolated; those land verbatim in `<section>.rej` with reasons in
//! `<section>.rej.log`, and everything else loads. Every input row ends
//! up counted exactly once - loaded or rejected.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use copyload::{Config, MemStore, Overrides, Section, SectionLoader};
//!
//! let config = Config::from_path("copyload.yaml".as_ref()).unwrap();
//! let section = Section::resolve("orders", &config, &Overrides::default()).unwrap();
//!
//! let mut store = MemStore::new(); // or PgStore::connect(&config.database)
//! let mut loader = SectionLoader::new(section, &mut store);
//! loader.run().unwrap();
//!
//! let summary = loader.summary().unwrap();
//! println!("{} rows loaded, {} rejected", summary.rows_loaded, summary.rows_rejected);
//! ```
//!
//! ## Modules
//!
//! - [`error`] - hierarchical error types
//! - [`config`] - YAML configuration and section resolution
//! - [`reader`] - row reading (delimited, text, fixed; offsets, limits)
//! - [`reformat`] - named per-column transform rules
//! - [`batch`] - batch accumulation and commit boundaries
//! - [`store`] - the `BulkStore` seam, PostgreSQL and in-memory backends
//! - [`loader`] - per-section orchestration and bisection recovery
//! - [`reject`] - durable reject data/reason files
//! - [`stats`] - per-section counters and summaries
//! - [`summary`] - summary table rendering

// Core modules
pub mod error;

// Configuration
pub mod config;

// Reading
pub mod reader;

// Transformation
pub mod reformat;

// Batching
pub mod batch;

// Target store
pub mod store;

// Orchestration
pub mod loader;

// Reject logging
pub mod reject;

// Statistics
pub mod stats;

// Reporting
pub mod summary;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError,
    LoadError,
    ReadError,
    ReformatError,
    StoreError,
};

// =============================================================================
// Re-exports - Configuration
// =============================================================================

pub use config::{
    Column,
    Config,
    DatabaseConfig,
    Format,
    Overrides,
    Section,
    SectionConfig,
    StartOffset,
};

// =============================================================================
// Re-exports - Reading & transformation
// =============================================================================

pub use reader::{RawRow, RowReader};
pub use reformat::{transform_field, ReformatRule, RULES};

// =============================================================================
// Re-exports - Batching
// =============================================================================

pub use batch::{Batch, BatchAccumulator, TransformedRow};

// =============================================================================
// Re-exports - Store
// =============================================================================

pub use store::{BulkStore, MemStore, PgStore};

// =============================================================================
// Re-exports - Loader & reporting
// =============================================================================

pub use loader::{LoadState, SectionLoader};
pub use reject::RejectLogger;
pub use stats::{SectionStats, Summary};
pub use summary::{duration_pprint, render_summary};
