//! SQLite record store
//!
//! Keeps every written record keyed by (site, product id) together with the
//! run that wrote it. A later run reads the seen ids and per-category counts
//! back to resume where the previous one stopped.

use crate::catalog::ProductRecord;
use crate::storage::schema::initialize_schema;
use crate::storage::sink::{RecordSink, StorageError, StorageResult};
use crate::storage::{RunRecord, RunStatus};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Records already written for a site by earlier runs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct History {
    pub seen: HashSet<String>,
    pub counts: HashMap<String, u64>,
}

/// SQLite storage backend for one site
pub struct SqliteSink {
    conn: Connection,
    path: Option<PathBuf>,
    site: String,
    run_id: Option<i64>,
}

impl SqliteSink {
    /// Opens or creates the database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    /// * `site` - Site whose records this handle reads and writes
    pub fn new(path: &Path, site: &str) -> StorageResult<Self> {
        let conn = open_connection(path)?;
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
            site: site.to_string(),
            run_id: None,
        })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory(site: &str) -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn,
            path: None,
            site: site.to_string(),
            run_id: None,
        })
    }

    /// Opens a second connection that writes records for the current run
    ///
    /// The engine owns its sink for the duration of a run; this handle stays
    /// behind to close the run afterwards.
    pub fn writer(&self) -> StorageResult<Self> {
        let path = self.path.as_deref().ok_or_else(|| {
            StorageError::Database("in-memory database cannot be reopened".to_string())
        })?;
        let run_id = self
            .run_id
            .ok_or_else(|| StorageError::Database("no active run".to_string()))?;

        let mut writer = Self::new(path, &self.site)?;
        writer.run_id = Some(run_id);
        Ok(writer)
    }

    pub fn site(&self) -> &str {
        &self.site
    }

    pub fn run_id(&self) -> Option<i64> {
        self.run_id
    }

    /// Starts a new run and makes it the target of subsequent writes
    pub fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (site, started_at, config_hash, status) VALUES (?1, ?2, ?3, ?4)",
            params![self.site, now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        let run_id = self.conn.last_insert_rowid();
        self.run_id = Some(run_id);
        Ok(run_id)
    }

    /// Starts a run and returns the history it continues from
    ///
    /// A resumed run continues from every record stored for this site. A
    /// fresh run starts with a truncated CSV, so the site's stored records are
    /// deleted first and the returned history is empty.
    pub fn begin_run(&mut self, config_hash: &str, resume: bool) -> StorageResult<History> {
        let history = if resume {
            self.load_history()?
        } else {
            let cleared = self.clear_records()?;
            if cleared > 0 {
                tracing::info!(
                    "Cleared {} stored records of site {} for a fresh run",
                    cleared,
                    self.site
                );
            }
            History::default()
        };
        self.create_run(config_hash)?;
        Ok(history)
    }

    /// Deletes every stored record of this site; run history is kept
    pub fn clear_records(&mut self) -> StorageResult<usize> {
        let deleted = self
            .conn
            .execute("DELETE FROM records WHERE site = ?1", params![self.site])?;
        Ok(deleted)
    }

    /// Marks the current run finished with `status`
    pub fn finish_run(&mut self, status: RunStatus) -> StorageResult<()> {
        let run_id = self
            .run_id
            .ok_or_else(|| StorageError::Database("no active run".to_string()))?;
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE runs SET finished_at = ?1, status = ?2 WHERE id = ?3",
            params![now, status.to_db_string(), run_id],
        )?;
        Ok(())
    }

    /// Loads seen ids and per-category counts from earlier runs of this site
    pub fn load_history(&self) -> StorageResult<History> {
        let mut history = History::default();

        let mut stmt = self
            .conn
            .prepare("SELECT product_id, category FROM records WHERE site = ?1")?;
        let rows = stmt.query_map(params![self.site], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        for row in rows {
            let (product_id, category) = row?;
            history.seen.insert(product_id);
            *history.counts.entry(category).or_insert(0) += 1;
        }

        Ok(history)
    }

    /// Total records stored for this site
    pub fn count_records(&self) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM records WHERE site = ?1",
            params![self.site],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Record counts per category, largest first
    pub fn records_by_category(&self) -> StorageResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT category, COUNT(*) AS n FROM records WHERE site = ?1
             GROUP BY category ORDER BY n DESC, category ASC",
        )?;
        let rows = stmt.query_map(params![self.site], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;

        let mut counts = Vec::new();
        for row in rows {
            counts.push(row?);
        }
        Ok(counts)
    }

    /// Number of runs recorded for this site
    pub fn count_runs(&self) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM runs WHERE site = ?1",
            params![self.site],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Gets the most recent run for this site
    pub fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, site, started_at, finished_at, config_hash, status
                 FROM runs WHERE site = ?1 ORDER BY id DESC LIMIT 1",
                params![self.site],
                |row| {
                    Ok(RunRecord {
                        id: row.get(0)?,
                        site: row.get(1)?,
                        started_at: row.get(2)?,
                        finished_at: row.get(3)?,
                        config_hash: row.get(4)?,
                        status: RunStatus::from_db_string(&row.get::<_, String>(5)?)
                            .unwrap_or(RunStatus::Running),
                    })
                },
            )
            .optional()?;
        Ok(run)
    }
}

impl RecordSink for SqliteSink {
    fn write(&mut self, record: &ProductRecord) -> StorageResult<()> {
        let run_id = self
            .run_id
            .ok_or_else(|| StorageError::Database("no active run".to_string()))?;
        let now = Utc::now().to_rfc3339();

        self.conn.execute(
            "INSERT OR IGNORE INTO records
             (site, product_id, description, url, price, reviews, rating, category, run_id, written_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                self.site,
                record.id,
                record.description,
                record.url,
                record.price,
                record.reviews as i64,
                record.rating,
                record.category,
                run_id,
                now
            ],
        )?;
        Ok(())
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }
}

fn open_connection(path: &Path) -> Result<Connection, rusqlite::Error> {
    let conn = Connection::open(path)?;

    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
    ",
    )?;

    initialize_schema(&conn)?;

    Ok(conn)
}
