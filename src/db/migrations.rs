//! Pool setup and schema creation.

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::time::Duration;
use tracing::info;

const SCHEMA: &str = include_str!("schema.sql");

/// Open (creating if needed) the ledger database and apply the schema.
///
/// Every connection gets foreign keys, WAL, a 5s busy timeout and
/// `synchronous = NORMAL`.
pub async fn init_db(db_path: &str) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .synchronous(SqliteSynchronous::Normal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    info!(path = db_path, "Ledger database ready");
    Ok(pool)
}

/// Apply `schema.sql`. Statements are idempotent, so this runs on every start.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let statements = SCHEMA
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty());
    for statement in statements {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
