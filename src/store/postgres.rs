//! PostgreSQL implementation of [`BulkStore`] over a single blocking
//! connection.
//!
//! Batches go through `COPY <table> (cols) FROM STDIN` in text format.
//! Transaction control uses explicit `BEGIN`/`COMMIT`/`ROLLBACK`
//! statements so the session stays transactional across trait calls,
//! and each batch attempt is fenced by a savepoint: a refused COPY
//! rolls back to the savepoint without losing earlier uncommitted
//! batches of the same commit window.

use std::io::Write;

use pg_escape::quote_identifier;

use crate::batch::TransformedRow;
use crate::config::DatabaseConfig;
use crate::error::{StoreError, StoreResult};
use crate::store::{format_copy_row, BulkStore};

const BATCH_SAVEPOINT: &str = "copyload_batch";

/// A live PostgreSQL connection.
pub struct PgStore {
    client: postgres::Client,
}

impl PgStore {
    /// Connect and apply session settings (client_encoding, datestyle).
    ///
    /// The password falls back to the `COPYLOAD_PASSWORD` environment
    /// variable when the configuration leaves it unset.
    pub fn connect(db: &DatabaseConfig) -> StoreResult<Self> {
        let mut config = postgres::Config::new();
        config
            .host(&db.host)
            .port(db.port)
            .dbname(&db.dbname)
            .user(&db.user);

        let password = db
            .password
            .clone()
            .or_else(|| std::env::var("COPYLOAD_PASSWORD").ok());
        if let Some(password) = password {
            config.password(password);
        }

        let mut client = config.connect(postgres::NoTls).map_err(classify)?;

        if let Some(ref encoding) = db.client_encoding {
            client
                .batch_execute(&format!("SET client_encoding TO '{encoding}'"))
                .map_err(classify)?;
        }
        if let Some(ref datestyle) = db.datestyle {
            client
                .batch_execute(&format!("SET datestyle TO '{datestyle}'"))
                .map_err(classify)?;
        }

        Ok(Self { client })
    }

    fn execute(&mut self, sql: &str) -> StoreResult<()> {
        self.client.batch_execute(sql).map_err(classify)
    }
}

impl BulkStore for PgStore {
    fn begin(&mut self) -> StoreResult<()> {
        self.execute("BEGIN")
    }

    fn commit(&mut self) -> StoreResult<()> {
        self.execute("COMMIT")
    }

    fn rollback(&mut self) -> StoreResult<()> {
        self.execute("ROLLBACK")
    }

    fn begin_segment(&mut self) -> StoreResult<()> {
        self.execute(&format!("SAVEPOINT {BATCH_SAVEPOINT}"))
    }

    fn commit_segment(&mut self) -> StoreResult<()> {
        self.execute(&format!("RELEASE SAVEPOINT {BATCH_SAVEPOINT}"))
    }

    fn rollback_segment(&mut self) -> StoreResult<()> {
        self.execute(&format!("ROLLBACK TO SAVEPOINT {BATCH_SAVEPOINT}"))
    }

    fn copy_in(
        &mut self,
        table: &str,
        columns: &[String],
        rows: &[TransformedRow],
    ) -> StoreResult<()> {
        let column_list = columns
            .iter()
            .map(|c| quote_identifier(c).to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let statement = format!(
            "COPY {} ({}) FROM STDIN",
            quote_identifier(table),
            column_list
        );

        let mut payload = String::new();
        for row in rows {
            payload.push_str(&format_copy_row(row));
        }

        let mut writer = self.client.copy_in(statement.as_str()).map_err(classify)?;
        writer
            .write_all(payload.as_bytes())
            .map_err(|e| StoreError::Connection(format!("COPY write failed: {e}")))?;
        // Data errors (bad literals, constraint violations) surface here.
        writer.finish().map_err(classify)?;
        Ok(())
    }

    fn truncate(&mut self, table: &str) -> StoreResult<()> {
        self.execute(&format!("TRUNCATE {}", quote_identifier(table)))
    }
}

/// Split a postgres error into data vs connection kind.
///
/// Server-reported errors with a connection-class SQLSTATE (class 08,
/// shutdown/crash 57P01..57P03, resource exhaustion 53300) are
/// connection failures; every other server error concerns the
/// submitted data. Client-side errors (socket gone, protocol break)
/// are always connection failures.
fn classify(err: postgres::Error) -> StoreError {
    match err.as_db_error() {
        Some(db_err) => {
            let code = db_err.code().code();
            let connection_class = code.starts_with("08")
                || code == "57P01"
                || code == "57P02"
                || code == "57P03"
                || code == "53300";
            if connection_class {
                StoreError::Connection(db_err.message().to_string())
            } else {
                StoreError::Data(db_err.message().to_string())
            }
        }
        None => StoreError::Connection(err.to_string()),
    }
}
