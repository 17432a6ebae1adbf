//! copyload CLI - bulk-load data files into PostgreSQL
//!
//! ```bash
//! copyload -c copyload.yaml                  # load every section
//! copyload -c copyload.yaml orders invoices  # load specific sections
//! copyload -n orders                         # dry run: read + reformat only
//! copyload -s orders                         # print a summary table
//! ```
//!
//! Sections run sequentially, sorted by name. The exit code is the
//! number of sections that rejected rows or failed, so `0` means a
//! fully clean load.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use copyload::{
    render_summary, BulkStore, Config, LoadError, MemStore, Overrides, PgStore, Section,
    SectionLoader, Summary,
};

#[derive(Parser)]
#[command(name = "copyload")]
#[command(about = "Load data files into PostgreSQL via COPY, with reject logging", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short = 'c', long, default_value = "copyload.yaml")]
    config: PathBuf,

    /// Sections to load (all sections when empty)
    sections: Vec<String>,

    /// Print a summary table at the end
    #[arg(short = 's', long)]
    summary: bool,

    /// Read and reformat input without connecting to the database
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Truncate target tables before loading
    #[arg(short = 'T', long)]
    truncate: bool,

    /// Stop after this many input records (applies to every section)
    #[arg(short = 'C', long)]
    count: Option<u64>,

    /// Skip this many input records (applies to every section)
    #[arg(short = 'F', long = "from")]
    fromcount: Option<u64>,

    /// Skip input records until this row id (applies to every section)
    #[arg(short = 'I', long = "from-id")]
    fromid: Option<String>,

    /// Input files encoding, overriding configuration
    #[arg(short = 'E', long)]
    encoding: Option<String>,

    /// Report progress for every section
    #[arg(short, long)]
    verbose: bool,

    /// Only print errors
    #[arg(short, long)]
    quiet: bool,

    /// Debug output (a lot of it)
    #[arg(short, long)]
    debug: bool,
}

fn main() -> ExitCode {
    // Load .env file (if present) for COPYLOAD_PASSWORD etc.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if cli.quiet && (cli.verbose || cli.debug) {
        eprintln!("Error: can't be verbose and quiet at the same time");
        return ExitCode::from(1);
    }
    if cli.fromcount.is_some() && cli.fromid.is_some() {
        eprintln!("Error: can't set both --from and --from-id");
        return ExitCode::from(1);
    }

    let level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_target(false)
        .init();

    let config = match Config::from_path(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::from(1);
        }
    };

    // Sections named on the command line, or every configured one;
    // always processed in sorted order.
    let mut selected: Vec<String> = if cli.sections.is_empty() {
        config.section_names()
    } else {
        let known = config.section_names();
        for name in &cli.sections {
            if !known.contains(name) {
                eprintln!("Error: no such section: '{name}'");
                return ExitCode::from(1);
            }
        }
        cli.sections.clone()
    };
    selected.sort();
    selected.dedup();

    let overrides = Overrides {
        count: cli.count,
        fromcount: cli.fromcount,
        fromid: cli.fromid.clone(),
        encoding: cli.encoding.clone(),
    };

    let mut store: Box<dyn BulkStore> = if cli.dry_run {
        info!("dry run mode, not connecting to the database");
        Box::new(MemStore::new())
    } else {
        match PgStore::connect(&config.database) {
            Ok(store) => Box::new(store),
            Err(e) => {
                eprintln!("Error: could not connect to PostgreSQL: {e}");
                return ExitCode::from(1);
            }
        }
    };

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        if let Err(e) = ctrlc::set_handler(move || cancel.store(true, Ordering::Relaxed)) {
            warn!("cannot install interrupt handler: {e}");
        }
    }

    let begin = Instant::now();
    let mut results: Vec<(String, Summary)> = Vec::new();
    let mut failed_sections: u32 = 0;

    for name in &selected {
        let section = match Section::resolve(name, &config, &overrides) {
            Ok(section) => section,
            Err(e) => {
                error!(section = name.as_str(), "{e}");
                failed_sections += 1;
                continue;
            }
        };

        let mut loader = SectionLoader::new(section, store.as_mut())
            .with_cancel_flag(Arc::clone(&cancel))
            .with_truncate(cli.truncate);

        if loader.is_template() {
            info!(section = name.as_str(), "skipping template section");
            continue;
        }

        let result = loader.run();
        let mut had_errors = false;
        let mut stop = false;

        if let Some(summary) = loader.summary() {
            had_errors = summary.rows_rejected > 0;
            results.push((name.clone(), summary.clone()));
        }

        match result {
            Ok(()) => {}
            Err(LoadError::Interrupted) => {
                eprintln!("Aborting on user demand (interrupt)");
                had_errors = true;
                stop = true;
            }
            Err(e) => {
                error!(section = name.as_str(), "{e}");
                had_errors = true;
                // No point trying the remaining sections without a
                // working store.
                stop = e.is_connection();
            }
        }

        if had_errors {
            failed_sections += 1;
        }
        if stop {
            break;
        }
    }

    if cli.summary && !results.is_empty() {
        println!();
        print!("{}", render_summary(&results, begin.elapsed()));
    }

    ExitCode::from(failed_sections.min(255) as u8)
}
