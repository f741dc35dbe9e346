//! Audit ledger operations: append-only executions and their back-references.

use crate::domain::{Execution, ExecutionKey, ExecutionRecord, Side, Symbol, TimeMs};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{decimal_column, is_unique_violation, RepoError, Repository};

const EXECUTION_COLUMNS: &str = "id, order_id, source, symbol, side, quantity, price, \
     total_notional, fees, executed_at, position_id, trade_history_id, created_at";

impl Repository {
    /// Check whether an execution with this `(order_id, source)` is already recorded.
    pub async fn execution_exists(&self, key: &ExecutionKey) -> Result<bool, RepoError> {
        let row = sqlx::query("SELECT 1 FROM executions WHERE order_id = ? AND source = ? LIMIT 1")
            .bind(&key.order_id)
            .bind(&key.source)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Append an execution to the audit ledger and return its row id.
    ///
    /// # Errors
    /// Returns `RepoError::Duplicate` if the key was recorded concurrently.
    pub async fn append_execution(&self, exec: &Execution) -> Result<i64, RepoError> {
        let result = sqlx::query(
            r#"
            INSERT INTO executions
            (order_id, source, symbol, side, quantity, price, total_notional, fees, executed_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&exec.key.order_id)
        .bind(&exec.key.source)
        .bind(exec.symbol.as_str())
        .bind(exec.side.as_str())
        .bind(exec.quantity.to_canonical_string())
        .bind(exec.price.to_canonical_string())
        .bind(exec.total_notional.to_canonical_string())
        .bind(exec.fees.to_canonical_string())
        .bind(exec.executed_at.as_ms())
        .bind(TimeMs::now().as_ms())
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => Ok(done.last_insert_rowid()),
            Err(e) if is_unique_violation(&e) => Err(RepoError::Duplicate(exec.key.clone())),
            Err(e) => Err(e.into()),
        }
    }

    /// Link an execution to the open position it was folded into.
    pub async fn attach_position(&self, execution_id: i64, position_id: i64) -> Result<(), RepoError> {
        let result = sqlx::query("UPDATE executions SET position_id = ? WHERE id = ?")
            .bind(position_id)
            .bind(execution_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound(format!("execution {}", execution_id)));
        }
        Ok(())
    }

    /// Link a single execution to a trade history record.
    pub async fn attach_trade_history(
        &self,
        execution_id: i64,
        trade_history_id: i64,
    ) -> Result<(), RepoError> {
        let result = sqlx::query("UPDATE executions SET trade_history_id = ? WHERE id = ?")
            .bind(trade_history_id)
            .bind(execution_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound(format!("execution {}", execution_id)));
        }
        Ok(())
    }

    /// Point every execution of an open position at the trade history record
    /// of the closed cycle. Returns the number of rows linked.
    pub async fn link_position_to_trade_history(
        &self,
        position_id: i64,
        trade_history_id: i64,
    ) -> Result<u64, RepoError> {
        let result = sqlx::query("UPDATE executions SET trade_history_id = ? WHERE position_id = ?")
            .bind(trade_history_id)
            .bind(position_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Fill in the trade history link of executions whose position was closed
    /// while the bulk relink failed. Returns the number of rows repaired.
    ///
    /// A closed cycle's trade history carries the id of its position, and
    /// executions keep that id after the position row is gone.
    pub async fn relink_closed_cycles(&self) -> Result<u64, RepoError> {
        let result = sqlx::query(
            r#"
            UPDATE executions
            SET trade_history_id = (
                SELECT MIN(th.id) FROM trade_history th
                WHERE th.position_id = executions.position_id
            )
            WHERE trade_history_id IS NULL
              AND position_id IN (SELECT position_id FROM trade_history)
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Executions of a symbol linked to neither a position nor a trade history,
    /// oldest first. These are discarded sells and fills whose linkage failed.
    pub async fn unlinked_executions(&self, symbol: &Symbol) -> Result<Vec<ExecutionRecord>, RepoError> {
        let sql = format!(
            "SELECT {} FROM executions \
             WHERE symbol = ? AND position_id IS NULL AND trade_history_id IS NULL \
             ORDER BY executed_at ASC, id ASC",
            EXECUTION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(symbol.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(execution_from_row).collect()
    }

    /// Executions folded into a position, oldest first.
    pub async fn executions_for_position(
        &self,
        position_id: i64,
    ) -> Result<Vec<ExecutionRecord>, RepoError> {
        let sql = format!(
            "SELECT {} FROM executions WHERE position_id = ? ORDER BY executed_at ASC, id ASC",
            EXECUTION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(position_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(execution_from_row).collect()
    }

    /// Executions linked to a closed cycle, oldest first.
    pub async fn executions_for_trade_history(
        &self,
        trade_history_id: i64,
    ) -> Result<Vec<ExecutionRecord>, RepoError> {
        let sql = format!(
            "SELECT {} FROM executions WHERE trade_history_id = ? ORDER BY executed_at ASC, id ASC",
            EXECUTION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(trade_history_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(execution_from_row).collect()
    }

    pub async fn get_execution(&self, id: i64) -> Result<Option<ExecutionRecord>, RepoError> {
        let sql = format!("SELECT {} FROM executions WHERE id = ?", EXECUTION_COLUMNS);
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(execution_from_row).transpose()
    }

    pub async fn get_execution_by_key(
        &self,
        key: &ExecutionKey,
    ) -> Result<Option<ExecutionRecord>, RepoError> {
        let sql = format!(
            "SELECT {} FROM executions WHERE order_id = ? AND source = ?",
            EXECUTION_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(&key.order_id)
            .bind(&key.source)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(execution_from_row).transpose()
    }

    /// Most recent executions for a symbol, newest first.
    pub async fn recent_executions(
        &self,
        symbol: &Symbol,
        limit: i64,
    ) -> Result<Vec<ExecutionRecord>, RepoError> {
        let sql = format!(
            "SELECT {} FROM executions WHERE symbol = ? ORDER BY executed_at DESC, id DESC LIMIT ?",
            EXECUTION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(symbol.as_str())
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(execution_from_row).collect()
    }

    pub async fn count_executions(&self) -> Result<i64, RepoError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM executions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

fn execution_from_row(row: &SqliteRow) -> Result<ExecutionRecord, RepoError> {
    const TABLE: &str = "executions";
    let id: i64 = row.try_get("id")?;
    let side_raw: String = row.try_get("side")?;
    let side = side_raw
        .parse::<Side>()
        .map_err(|_| RepoError::Corrupt {
            table: TABLE,
            column: "side",
            id,
            value: side_raw.clone(),
        })?;

    let execution = Execution {
        key: ExecutionKey::new(
            row.try_get::<String, _>("order_id")?,
            row.try_get::<String, _>("source")?,
        ),
        symbol: Symbol::new(row.try_get::<String, _>("symbol")?),
        side,
        quantity: decimal_column(row, TABLE, "quantity")?,
        price: decimal_column(row, TABLE, "price")?,
        total_notional: decimal_column(row, TABLE, "total_notional")?,
        fees: decimal_column(row, TABLE, "fees")?,
        executed_at: TimeMs::new(row.try_get("executed_at")?),
    };

    Ok(ExecutionRecord {
        id,
        execution,
        position_id: row.try_get("position_id")?,
        trade_history_id: row.try_get("trade_history_id")?,
        created_at: TimeMs::new(row.try_get("created_at")?),
    })
}
