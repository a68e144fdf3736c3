//! Database lifecycle and schema migrations.

use crate::error::DatabaseError;
use crate::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};
use sqlx::{Connection, SqliteConnection};
use std::path::Path;
use std::str::FromStr;

use super::Database;

/// Latest schema version this build knows how to create
pub(crate) const SCHEMA_VERSION: i64 = 1;

fn connection_failed(context: &'static str) -> impl FnOnce(sqlx::Error) -> Error {
    move |e| Error::Database(DatabaseError::ConnectionFailed(format!("{}: {}", context, e)))
}

fn migration_failed(context: &'static str) -> impl FnOnce(sqlx::Error) -> Error {
    move |e| Error::Database(DatabaseError::MigrationFailed(format!("{}: {}", context, e)))
}

impl Database {
    /// Open (or create) the task database at `path`
    ///
    /// Missing parent directories are created, the journal is switched to
    /// WAL and pending migrations are applied.
    pub async fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "cannot create database directory {}: {}",
                    parent.display(),
                    e
                )))
            })?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(connection_failed("invalid database path"))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(connection_failed("cannot open database"))?;

        let db = Self { pool };
        db.run_migrations().await?;

        tracing::debug!(path = %path.display(), "task database ready");
        Ok(db)
    }

    /// Bring the schema up to [`SCHEMA_VERSION`]
    async fn run_migrations(&self) -> Result<()> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(connection_failed("cannot acquire connection"))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )",
        )
        .execute(&mut *conn)
        .await
        .map_err(migration_failed("cannot create schema_version"))?;

        let current: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_version")
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| Error::Database(DatabaseError::QueryFailed(e.to_string())))?;

        if current > SCHEMA_VERSION {
            tracing::warn!(
                current,
                known = SCHEMA_VERSION,
                "database schema is newer than this build"
            );
        }
        if current < 1 {
            Self::migrate_v1(&mut conn).await?;
        }

        Ok(())
    }

    /// v1: the tasks table
    ///
    /// Applied in one transaction; a failure leaves the database untouched.
    async fn migrate_v1(conn: &mut SqliteConnection) -> Result<()> {
        tracing::info!(version = 1, "applying task database migration");

        let mut tx = conn
            .begin()
            .await
            .map_err(migration_failed("cannot begin migration v1"))?;

        for statement in [
            "CREATE TABLE tasks (
                task_id TEXT PRIMARY KEY NOT NULL,
                release_id TEXT NOT NULL,
                name TEXT NOT NULL,
                date_submitted INTEGER NOT NULL,
                progress INTEGER,
                state TEXT NOT NULL,
                error TEXT,
                updated_at INTEGER NOT NULL
            )",
            "CREATE INDEX idx_tasks_state ON tasks(state)",
            "CREATE INDEX idx_tasks_release ON tasks(release_id)",
        ] {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .map_err(migration_failed("migration v1"))?;
        }

        sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES (?, ?)")
            .bind(1i64)
            .bind(chrono::Utc::now().timestamp())
            .execute(&mut *tx)
            .await
            .map_err(migration_failed("cannot record migration v1"))?;

        tx.commit()
            .await
            .map_err(migration_failed("cannot commit migration v1"))?;

        Ok(())
    }

    /// Close the connection pool, waiting for in-flight queries
    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
