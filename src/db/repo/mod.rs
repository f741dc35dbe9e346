//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct for all database operations.
//! Methods are organized across submodules by table:
//! - `executions.rs` - Audit ledger: append, dedup, back-references
//! - `positions.rs` - Open positions with optimistic concurrency
//! - `trade_history.rs` - Closed cycles and journal statistics

mod executions;
mod positions;
mod trade_history;

use crate::domain::{Decimal, DecimalOverflow, ExecutionKey};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error("execution {0} already recorded")]
    Duplicate(ExecutionKey),
    #[error("position for {symbol} was modified concurrently")]
    Conflict { symbol: String },
    #[error("{0} not found")]
    NotFound(String),
    #[error("corrupt {table}.{column} in row {id}: {value:?}")]
    Corrupt {
        table: &'static str,
        column: &'static str,
        id: i64,
        value: String,
    },
    #[error(transparent)]
    Arithmetic(#[from] DecimalOverflow),
}

impl RepoError {
    /// True for errors that a fresh read-modify-write may resolve.
    pub fn is_conflict(&self) -> bool {
        matches!(self, RepoError::Conflict { .. })
    }
}

/// Repository for database operations.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

/// Read a TEXT column holding a canonical decimal.
fn decimal_column(
    row: &SqliteRow,
    table: &'static str,
    column: &'static str,
) -> Result<Decimal, RepoError> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str_canonical(&raw).map_err(|_| RepoError::Corrupt {
        table,
        column,
        id: row.try_get("id").unwrap_or_default(),
        value: raw,
    })
}

fn opt_decimal_column(
    row: &SqliteRow,
    table: &'static str,
    column: &'static str,
) -> Result<Option<Decimal>, RepoError> {
    let raw: Option<String> = row.try_get(column)?;
    match raw {
        None => Ok(None),
        Some(raw) => Decimal::from_str_canonical(&raw)
            .map(Some)
            .map_err(|_| RepoError::Corrupt {
                table,
                column,
                id: row.try_get("id").unwrap_or_default(),
                value: raw,
            }),
    }
}
