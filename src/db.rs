//! SQLite connection pool.
//!
//! WAL journaling with foreign keys enforced; document and snippet cascades
//! depend on the latter. The database file and its parent directory are
//! created on first connect, so `init` works against a fresh checkout.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::config::Config;
use crate::error::Result;

const MAX_CONNECTIONS: u32 = 5;

pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let path = &config.db.path;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_with(options)
        .await?;

    debug!(path = %path.display(), "database pool ready");
    Ok(pool)
}
