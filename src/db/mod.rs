//! Database connection pool, migrations, and health check.
//!
//! SQLite via SQLx is the single source of truth for hierarchy records,
//! cases, messages and the audit trail. Nothing is cached in process;
//! every operation reads fresh rows inside its own transaction.

pub mod actions;
pub mod cases;
pub mod hierarchy;
pub mod messages;
pub mod retry;

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::error::Result;

pub use retry::RetryPolicy;

/// How long a connection waits on a locked database before SQLite reports BUSY.
const BUSY_TIMEOUT: Duration = Duration::from_secs(2);

/// Database handle. Owns the connection pool shared across all modules.
#[derive(Debug, Clone)]
pub struct Db {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl Db {
    /// Open (or create) a file-backed database, e.g. `sqlite://cases.db`.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await?;
        Ok(Self {
            pool,
            retry: RetryPolicy::default(),
        })
    }

    /// A private in-memory database (for testing and demos).
    ///
    /// Pinned to one connection that is never recycled: an in-memory
    /// SQLite database lives exactly as long as its connection.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let db = Self {
            pool,
            retry: RetryPolicy::default(),
        };
        db.migrate().await?;
        Ok(db)
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Run all pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Simple health check: run a SELECT 1.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Start a transaction. Dropping it without `commit` rolls back.
    pub(crate) async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    /// Get a reference to the connection pool (for submodules).
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
