// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod schema;

use std::path::PathBuf;

use rusqlite::{Connection, OpenFlags, params};
use tracing::{debug, error, info, warn};

use crate::episode::{DownloadStatus, ListingEntry, StoredEpisode};
use crate::error::StoreError;

pub use schema::{default_schema, quote_ident, validate_name};

/// File extension of database files under the data directory
const DATABASE_EXTENSION: &str = "sqlite3";

/// Durable record of known episodes
///
/// Each database is one SQLite file under the data directory. A connection
/// is opened per operation and closed when the operation returns.
#[derive(Debug, Clone)]
pub struct EpisodeStore {
    data_dir: PathBuf,
}

impl EpisodeStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Location of the database file for `name`
    pub fn database_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(format!("{}.{}", name, DATABASE_EXTENSION))
    }

    pub fn database_exists(&self, name: &str) -> Result<bool, StoreError> {
        validate_name("database", name)?;
        Ok(self.database_path(name).is_file())
    }

    /// Create the database; returns `false` if it already existed
    pub fn create_database(&self, name: &str) -> Result<bool, StoreError> {
        if self.database_exists(name)? {
            debug!(database = name, "database already exists");
            return Ok(false);
        }

        std::fs::create_dir_all(&self.data_dir).map_err(|e| StoreError::DataDir {
            path: self.data_dir.clone(),
            source: e,
        })?;

        let path = self.database_path(name);
        let creation_error = |source| StoreError::Creation {
            name: name.to_string(),
            source,
        };
        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )
        .map_err(creation_error)?;
        // Materialize the file header so the database exists on disk
        conn.execute_batch("PRAGMA user_version = 1;")
            .map_err(creation_error)?;

        info!(database = name, path = %path.display(), "database created");
        Ok(true)
    }

    /// Remove the database; returns `false` if there was nothing to remove
    pub fn drop_database(&self, name: &str) -> Result<bool, StoreError> {
        if !self.database_exists(name)? {
            return Ok(false);
        }

        let path = self.database_path(name);
        std::fs::remove_file(&path).map_err(|e| StoreError::Remove {
            path: path.clone(),
            source: e,
        })?;
        info!(database = name, "database dropped");
        Ok(true)
    }

    pub fn table_exists(&self, database: &str, table: &str) -> Result<bool, StoreError> {
        validate_name("table", table)?;
        if !self.database_exists(database)? {
            return Ok(false);
        }

        let conn = self.open(database, true)?;
        let exists = conn
            .prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1")
            .and_then(|mut stmt| stmt.exists(params![table]))
            .map_err(|source| StoreError::Query {
                table: table.to_string(),
                source,
            })?;
        Ok(exists)
    }

    /// Create `table` by running `schema` as one transaction
    ///
    /// Returns `false` without touching anything when the table exists. Any
    /// failing statement rolls back the statements before it.
    pub fn create_table(
        &self,
        database: &str,
        table: &str,
        schema: &[String],
    ) -> Result<bool, StoreError> {
        if schema.is_empty() {
            return Err(StoreError::Precondition {
                param: "schema",
                value: String::new(),
                reason: "must contain at least one statement",
            });
        }
        if self.table_exists(database, table)? {
            debug!(database, table, "table already exists");
            return Ok(false);
        }

        let schema_error = |source| StoreError::SchemaApply {
            table: table.to_string(),
            source,
        };

        let mut conn = self.open(database, false)?;
        let tx = conn.transaction().map_err(schema_error)?;
        for statement in schema {
            if let Err(e) = tx.execute_batch(statement) {
                error!(database, table, error = %e, "schema statement failed, rolling back");
                return Err(schema_error(e));
            }
        }
        tx.commit().map_err(schema_error)?;

        info!(database, table, "table created");
        Ok(true)
    }

    /// Drop `table`; returns `false` if it did not exist
    pub fn drop_table(&self, database: &str, table: &str) -> Result<bool, StoreError> {
        if !self.table_exists(database, table)? {
            return Ok(false);
        }

        let conn = self.open(database, false)?;
        conn.execute_batch(&format!("DROP TABLE {}", quote_ident(table)))
            .map_err(|source| StoreError::SchemaApply {
                table: table.to_string(),
                source,
            })?;
        info!(database, table, "table dropped");
        Ok(true)
    }

    /// Record `entries` as one batch
    ///
    /// Values are bound as parameters. If any row fails, none are kept.
    pub fn insert_episodes(
        &self,
        database: &str,
        table: &str,
        entries: &[ListingEntry],
    ) -> Result<usize, StoreError> {
        validate_name("database", database)?;
        validate_name("table", table)?;
        if entries.is_empty() {
            return Ok(0);
        }

        let write_error = |source| StoreError::Write {
            table: table.to_string(),
            count: entries.len(),
            source,
        };

        let mut conn = self.open(database, false)?;
        let tx = conn.transaction().map_err(write_error)?;
        {
            let mut stmt = tx
                .prepare(&format!(
                    "INSERT INTO {} (title, url, updated_time) VALUES (?1, ?2, datetime('now'))",
                    quote_ident(table)
                ))
                .map_err(write_error)?;

            for entry in entries {
                if let Err(e) = stmt.execute(params![entry.title(), entry.url()]) {
                    error!(title = %entry.title(), error = %e, "insert failed, rolling back batch");
                    return Err(write_error(e));
                }
            }
        }
        tx.commit().map_err(write_error)?;

        info!(database, table, count = entries.len(), "episodes recorded");
        Ok(entries.len())
    }

    /// Entries whose title has no row in `table`, in input order
    ///
    /// Opens the database read-only; never modifies it.
    pub fn diff_against_store(
        &self,
        database: &str,
        table: &str,
        entries: &[ListingEntry],
    ) -> Result<Vec<ListingEntry>, StoreError> {
        validate_name("database", database)?;
        validate_name("table", table)?;

        let query_error = |source| StoreError::Query {
            table: table.to_string(),
            source,
        };

        let conn = self.open(database, true)?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT 1 FROM {} WHERE title = ?1 LIMIT 1",
                quote_ident(table)
            ))
            .map_err(query_error)?;

        let mut delta = Vec::new();
        for entry in entries {
            if !stmt.exists(params![entry.title()]).map_err(query_error)? {
                info!(title = %entry.title(), "episode not yet recorded");
                delta.push(entry.clone());
            }
        }

        Ok(delta)
    }

    /// Mark the episode `title` as downloaded; returns `false` if no row matched
    pub fn mark_downloaded(
        &self,
        database: &str,
        table: &str,
        title: &str,
    ) -> Result<bool, StoreError> {
        validate_name("database", database)?;
        validate_name("table", table)?;

        let conn = self.open(database, false)?;
        let changed = conn
            .execute(
                &format!(
                    "UPDATE {} SET download_status = ?1, updated_time = datetime('now') WHERE title = ?2",
                    quote_ident(table)
                ),
                params![DownloadStatus::Downloaded.as_str(), title],
            )
            .map_err(|source| StoreError::Write {
                table: table.to_string(),
                count: 1,
                source,
            })?;

        Ok(changed > 0)
    }

    /// Recorded episodes still marked `NO`, in insertion order
    ///
    /// Rows without a URL cannot be acquired and are skipped.
    pub fn pending_episodes(
        &self,
        database: &str,
        table: &str,
    ) -> Result<Vec<ListingEntry>, StoreError> {
        validate_name("database", database)?;
        validate_name("table", table)?;

        let query_error = |source| StoreError::Query {
            table: table.to_string(),
            source,
        };

        let conn = self.open(database, true)?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT title, url FROM {} WHERE download_status = ?1 ORDER BY id",
                quote_ident(table)
            ))
            .map_err(query_error)?;

        let rows = stmt
            .query_map(params![DownloadStatus::NotDownloaded.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
            })
            .map_err(query_error)?;

        let mut pending = Vec::new();
        for row in rows {
            match row.map_err(query_error)? {
                (title, Some(url)) => pending.push(ListingEntry::new(&title, url)),
                (title, None) => warn!(title = %title, "pending episode has no URL, skipping"),
            }
        }

        debug!(database, table, count = pending.len(), "pending episodes");
        Ok(pending)
    }

    /// All rows of `table` in insertion order
    pub fn episodes(&self, database: &str, table: &str) -> Result<Vec<StoredEpisode>, StoreError> {
        validate_name("database", database)?;
        validate_name("table", table)?;

        let query_error = |source| StoreError::Query {
            table: table.to_string(),
            source,
        };

        let conn = self.open(database, true)?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT id, title, url, download_status, updated_time FROM {} ORDER BY id",
                quote_ident(table)
            ))
            .map_err(query_error)?;

        let rows = stmt
            .query_map([], |row| {
                let status: String = row.get(3)?;
                Ok(StoredEpisode {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    url: row.get(2)?,
                    status: status.parse().unwrap_or_else(|e| {
                        warn!(error = %e, "unreadable download status, treating as not downloaded");
                        DownloadStatus::NotDownloaded
                    }),
                    updated_time: row.get(4)?,
                })
            })
            .map_err(query_error)?;

        let episodes = rows.collect::<Result<Vec<_>, _>>().map_err(query_error)?;
        Ok(episodes)
    }

    fn open(&self, name: &str, read_only: bool) -> Result<Connection, StoreError> {
        let flags = if read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE
        };
        Connection::open_with_flags(self.database_path(name), flags).map_err(|source| {
            StoreError::Open {
                name: name.to_string(),
                source,
            }
        })
    }
}
