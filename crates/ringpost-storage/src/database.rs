// SPDX-FileCopyrightText: 2026 Ringpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background thread.
//! Do NOT create additional Connection instances for writes: the port
//! compare-and-set relies on every writer going through this one connection.

use ringpost_config::model::StorageConfig;
use ringpost_core::DialerError;
use tracing::{debug, info};

use crate::migrations::run_migrations;

/// Shared handle to the dialer database.
///
/// Cloning is cheap: all clones talk to the same background connection thread.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (creating if needed) the database at `path` in WAL mode and run
    /// pending migrations.
    pub async fn open(path: &str) -> Result<Self, DialerError> {
        Self::open_with(path, true).await
    }

    /// Open the database described by the `[storage]` config section.
    pub async fn from_config(config: &StorageConfig) -> Result<Self, DialerError> {
        if let Some(parent) = std::path::Path::new(&config.database_path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(DialerError::storage)?;
        }
        Self::open_with(&config.database_path, config.wal_mode).await
    }

    /// Open a private in-memory database. Used by tests and `--dry-run` style tooling.
    pub async fn open_in_memory() -> Result<Self, DialerError> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(DialerError::storage)?;
        let db = Self { conn };
        db.initialize(false).await?;
        Ok(db)
    }

    async fn open_with(path: &str, wal_mode: bool) -> Result<Self, DialerError> {
        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(DialerError::storage)?;
        let db = Self { conn };
        db.initialize(wal_mode).await?;
        info!(path, wal_mode, "database opened");
        Ok(db)
    }

    async fn initialize(&self, wal_mode: bool) -> Result<(), DialerError> {
        self.conn
            .call(move |conn| {
                if wal_mode {
                    let mode: String =
                        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
                    debug!(journal_mode = %mode, "journal mode set");
                }
                conn.execute_batch(
                    "PRAGMA foreign_keys = ON;
                     PRAGMA busy_timeout = 5000;
                     PRAGMA synchronous = NORMAL;",
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;

        self.conn
            .call(|conn| Ok(run_migrations(conn)))
            .await
            .map_err(map_tr_err)??;
        Ok(())
    }

    /// The underlying async connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Flush the WAL and close the connection.
    pub async fn close(self) -> Result<(), DialerError> {
        self.conn
            .call(|conn| {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        self.conn.close().await.map_err(DialerError::storage)
    }
}

/// Convert a tokio-rusqlite error into DialerError::Storage.
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> DialerError {
    DialerError::storage(e)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_runs_migrations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ringpost.db");
        let db = Database::open(path.to_str().unwrap()).await.unwrap();

        let tables: Vec<String> = db
            .connection()
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
                )?;
                let rows = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok::<_, rusqlite::Error>(rows)
            })
            .await
            .unwrap();

        for table in ["ports", "port_events", "dialer_jobs", "job_contacts", "call_attempts"] {
            assert!(tables.iter().any(|t| t == table), "missing {table}: {tables:?}");
        }
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn reopening_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ringpost.db");
        let path = path.to_str().unwrap();
        Database::open(path).await.unwrap().close().await.unwrap();
        Database::open(path).await.unwrap().close().await.unwrap();
    }

    #[tokio::test]
    async fn from_config_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            database_path: dir
                .path()
                .join("nested/data/ringpost.db")
                .to_string_lossy()
                .into_owned(),
            wal_mode: true,
        };
        let db = Database::from_config(&config).await.unwrap();
        db.close().await.unwrap();
        assert!(dir.path().join("nested/data/ringpost.db").exists());
    }
}
