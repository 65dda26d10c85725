//! Database lifecycle and schema migrations.

use crate::error::DatabaseError;
use crate::{Error, Result};
use sqlx::SqliteConnection;
use sqlx::sqlite::SqlitePool;
use std::path::Path;

use super::Database;

impl Database {
    /// Create a new database connection
    ///
    /// Creates the database file if it doesn't exist and runs migrations.
    pub async fn new(path: &Path) -> Result<Self> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "Failed to create database directory: {}",
                    e
                )))
            })?;
        }

        // WAL lets other processes read while a batch commit is in progress
        use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous};
        use std::str::FromStr;

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "Failed to parse database path: {}",
                    e
                )))
            })?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full);

        let pool = SqlitePool::connect_with(options).await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to connect to database: {}",
                e
            )))
        })?;

        let db = Self { pool };

        db.run_migrations().await?;

        Ok(db)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to acquire connection: {}",
                e
            )))
        })?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::MigrationFailed(format!(
                "Failed to create schema_version table: {}",
                e
            )))
        })?;

        let current_version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
                .fetch_optional(&mut *conn)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to query schema version: {}",
                        e
                    )))
                })?
                .flatten();

        let current_version = current_version.unwrap_or(0);

        if current_version < 1 {
            Self::apply_migration(&mut conn, 1, &V1_PROGRESS_SCHEMA).await?;
        }
        if current_version < 2 {
            Self::apply_migration(&mut conn, 2, &V2_JOB_RUNS_SCHEMA).await?;
        }

        Ok(())
    }

    /// Apply one migration's statements inside a transaction
    async fn apply_migration(
        conn: &mut SqliteConnection,
        version: i32,
        statements: &[(&str, &str)],
    ) -> Result<()> {
        tracing::info!(version, "Applying database migration");

        // Wrap migration in a transaction so partial failures don't leave the DB in a broken state
        sqlx::query("BEGIN")
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::MigrationFailed(format!(
                    "Failed to begin transaction: {}",
                    e
                )))
            })?;

        let result = async {
            for (what, sql) in statements {
                sqlx::query(sql).execute(&mut *conn).await.map_err(|e| {
                    Error::Database(DatabaseError::MigrationFailed(format!(
                        "Failed to create {}: {}",
                        what, e
                    )))
                })?;
            }
            Self::record_migration(conn, version).await?;
            Ok::<(), Error>(())
        }
        .await;

        match result {
            Ok(()) => {
                sqlx::query("COMMIT")
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| {
                        Error::Database(DatabaseError::MigrationFailed(format!(
                            "Failed to commit migration v{}: {}",
                            version, e
                        )))
                    })?;
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                return Err(e);
            }
        }

        tracing::info!(version, "Database migration complete");
        Ok(())
    }

    async fn record_migration(conn: &mut SqliteConnection, version: i32) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES (?, ?)")
            .bind(version)
            .bind(now)
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::MigrationFailed(format!(
                    "Failed to record migration v{}: {}",
                    version, e
                )))
            })?;
        Ok(())
    }

    /// Close the database connection
    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Get the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Migration v1: the four per-account progress sets plus the user pool
const V1_PROGRESS_SCHEMA: [(&str, &str); 6] = [
    (
        "imported_contacts table",
        r#"
        CREATE TABLE imported_contacts (
            account_id TEXT NOT NULL,
            phone TEXT NOT NULL,
            display_name TEXT NOT NULL,
            remote_id INTEGER,
            imported_at INTEGER NOT NULL,
            PRIMARY KEY (account_id, phone)
        )
        "#,
    ),
    (
        "remote_users table",
        r#"
        CREATE TABLE remote_users (
            account_id TEXT NOT NULL,
            remote_id INTEGER NOT NULL,
            access_token TEXT,
            display_name TEXT NOT NULL,
            phone TEXT NOT NULL DEFAULT '',
            imported_at INTEGER NOT NULL,
            seq INTEGER NOT NULL,
            PRIMARY KEY (account_id, remote_id)
        )
        "#,
    ),
    (
        "failed_imports table",
        r#"
        CREATE TABLE failed_imports (
            account_id TEXT NOT NULL,
            phone TEXT NOT NULL,
            display_name TEXT NOT NULL,
            reason TEXT NOT NULL,
            detail TEXT,
            failed_at INTEGER NOT NULL,
            PRIMARY KEY (account_id, phone)
        )
        "#,
    ),
    (
        "invited_users table",
        r#"
        CREATE TABLE invited_users (
            account_id TEXT NOT NULL,
            remote_id INTEGER NOT NULL,
            invited_at INTEGER NOT NULL,
            PRIMARY KEY (account_id, remote_id)
        )
        "#,
    ),
    (
        "failed_invites table",
        r#"
        CREATE TABLE failed_invites (
            account_id TEXT NOT NULL,
            remote_id INTEGER NOT NULL,
            access_token TEXT,
            display_name TEXT NOT NULL,
            phone TEXT NOT NULL DEFAULT '',
            reason TEXT NOT NULL,
            detail TEXT,
            failed_at INTEGER NOT NULL,
            PRIMARY KEY (account_id, remote_id)
        )
        "#,
    ),
    (
        "remote_users order index",
        "CREATE INDEX idx_remote_users_seq ON remote_users(account_id, seq)",
    ),
];

/// Migration v2: job-run history
const V2_JOB_RUNS_SCHEMA: [(&str, &str); 2] = [
    (
        "job_runs table",
        r#"
        CREATE TABLE job_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            state TEXT NOT NULL,
            started_at INTEGER NOT NULL,
            finished_at INTEGER,
            succeeded INTEGER NOT NULL DEFAULT 0,
            failed INTEGER NOT NULL DEFAULT 0,
            abort_code TEXT,
            abort_message TEXT
        )
        "#,
    ),
    (
        "job_runs lookup index",
        "CREATE INDEX idx_job_runs_account_kind ON job_runs(account_id, kind, id DESC)",
    ),
];
