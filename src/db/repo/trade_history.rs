//! Trade journal operations: closed cycles, review notes and statistics.

use crate::domain::{ClosedCycle, Symbol, TimeMs, TradeHistory, TradeJournal};
use crate::engine::TradeStats;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{decimal_column, opt_decimal_column, RepoError, Repository};

const HISTORY_COLUMNS: &str = "id, position_id, symbol, quantity, entry_price, exit_price, \
     total_cost, fees, entry_date, exit_date, holding_period_hours, realized_pnl, \
     realized_pnl_pct, entry_reason, entry_rsi, exit_reason, exit_rsi, max_drawdown_pct, \
     emotional_state, conviction_level, market_conditions, what_went_right, what_went_wrong, \
     trade_grade, strategy_tag, notes, created_at";

impl Repository {
    /// Persist the figures of a closed cycle. The journal starts empty.
    pub async fn create_trade_history(&self, cycle: &ClosedCycle) -> Result<TradeHistory, RepoError> {
        let now = TimeMs::now();
        let result = sqlx::query(
            r#"
            INSERT INTO trade_history
            (position_id, symbol, quantity, entry_price, exit_price, total_cost, fees, entry_date,
             exit_date, holding_period_hours, realized_pnl, realized_pnl_pct, entry_reason,
             entry_rsi, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(cycle.position_id)
        .bind(cycle.symbol.as_str())
        .bind(cycle.quantity.to_canonical_string())
        .bind(cycle.entry_price.to_canonical_string())
        .bind(cycle.exit_price.to_canonical_string())
        .bind(cycle.total_cost.to_canonical_string())
        .bind(cycle.fees.to_canonical_string())
        .bind(cycle.entry_date.as_ms())
        .bind(cycle.exit_date.as_ms())
        .bind(cycle.holding_period_hours)
        .bind(cycle.realized_pnl.to_canonical_string())
        .bind(cycle.realized_pnl_pct.to_canonical_string())
        .bind(cycle.entry_reason.as_deref())
        .bind(cycle.entry_rsi.map(|d| d.to_canonical_string()))
        .bind(now.as_ms())
        .execute(&self.pool)
        .await?;

        Ok(TradeHistory {
            id: result.last_insert_rowid(),
            cycle: cycle.clone(),
            journal: TradeJournal::default(),
            created_at: now,
        })
    }

    /// Overwrite the review notes of a closed cycle. The computed figures are
    /// never touched.
    ///
    /// # Errors
    /// `RepoError::NotFound` when no record has this id.
    pub async fn update_trade_journal(
        &self,
        id: i64,
        journal: &TradeJournal,
    ) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"
            UPDATE trade_history SET
                exit_reason = ?, exit_rsi = ?, max_drawdown_pct = ?, emotional_state = ?,
                conviction_level = ?, market_conditions = ?, what_went_right = ?,
                what_went_wrong = ?, trade_grade = ?, strategy_tag = ?, notes = ?
            WHERE id = ?
            "#,
        )
        .bind(journal.exit_reason.as_deref())
        .bind(journal.exit_rsi.map(|d| d.to_canonical_string()))
        .bind(journal.max_drawdown_pct.map(|d| d.to_canonical_string()))
        .bind(journal.emotional_state)
        .bind(journal.conviction_level)
        .bind(journal.market_conditions.as_deref())
        .bind(journal.what_went_right.as_deref())
        .bind(journal.what_went_wrong.as_deref())
        .bind(journal.trade_grade.as_deref())
        .bind(journal.strategy_tag.as_deref())
        .bind(journal.notes.as_deref())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound(format!("trade history {}", id)));
        }
        Ok(())
    }

    pub async fn get_trade_history(&self, id: i64) -> Result<Option<TradeHistory>, RepoError> {
        let sql = format!("SELECT {} FROM trade_history WHERE id = ?", HISTORY_COLUMNS);
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(history_from_row).transpose()
    }

    /// Closed cycles for a symbol, most recent exit first.
    pub async fn trade_history_by_symbol(
        &self,
        symbol: &Symbol,
        limit: i64,
    ) -> Result<Vec<TradeHistory>, RepoError> {
        let sql = format!(
            "SELECT {} FROM trade_history WHERE symbol = ? ORDER BY exit_date DESC, id DESC LIMIT ?",
            HISTORY_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(symbol.as_str())
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(history_from_row).collect()
    }

    /// Cycles whose exit falls within `[from, to]`, most recent exit first.
    pub async fn trade_history_by_date_range(
        &self,
        from: TimeMs,
        to: TimeMs,
    ) -> Result<Vec<TradeHistory>, RepoError> {
        let sql = format!(
            "SELECT {} FROM trade_history WHERE exit_date >= ? AND exit_date <= ? \
             ORDER BY exit_date DESC, id DESC",
            HISTORY_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(from.as_ms())
            .bind(to.as_ms())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(history_from_row).collect()
    }

    /// Cycles tagged with `strategy_tag` in their journal, most recent exit first.
    pub async fn trade_history_by_strategy(
        &self,
        strategy_tag: &str,
        limit: i64,
    ) -> Result<Vec<TradeHistory>, RepoError> {
        let sql = format!(
            "SELECT {} FROM trade_history WHERE strategy_tag = ? \
             ORDER BY exit_date DESC, id DESC LIMIT ?",
            HISTORY_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(strategy_tag)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(history_from_row).collect()
    }

    /// All closed cycles, most recent exit first.
    pub async fn all_trade_history(&self, limit: i64) -> Result<Vec<TradeHistory>, RepoError> {
        let sql = format!(
            "SELECT {} FROM trade_history ORDER BY exit_date DESC, id DESC LIMIT ?",
            HISTORY_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(limit).fetch_all(&self.pool).await?;
        rows.iter().map(history_from_row).collect()
    }

    /// Win/loss statistics over the whole journal.
    ///
    /// Decimals are stored as text, so aggregation happens in Rust rather than SQL.
    pub async fn trade_stats(&self) -> Result<TradeStats, RepoError> {
        let sql = format!("SELECT {} FROM trade_history ORDER BY id ASC", HISTORY_COLUMNS);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        let history = rows
            .iter()
            .map(history_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(TradeStats::from_cycles(history.iter().map(|h| &h.cycle))?)
    }
}

fn history_from_row(row: &SqliteRow) -> Result<TradeHistory, RepoError> {
    const TABLE: &str = "trade_history";
    let cycle = ClosedCycle {
        position_id: row.try_get("position_id")?,
        symbol: Symbol::new(row.try_get::<String, _>("symbol")?),
        quantity: decimal_column(row, TABLE, "quantity")?,
        entry_price: decimal_column(row, TABLE, "entry_price")?,
        exit_price: decimal_column(row, TABLE, "exit_price")?,
        total_cost: decimal_column(row, TABLE, "total_cost")?,
        fees: decimal_column(row, TABLE, "fees")?,
        entry_date: TimeMs::new(row.try_get("entry_date")?),
        exit_date: TimeMs::new(row.try_get("exit_date")?),
        holding_period_hours: row.try_get("holding_period_hours")?,
        realized_pnl: decimal_column(row, TABLE, "realized_pnl")?,
        realized_pnl_pct: decimal_column(row, TABLE, "realized_pnl_pct")?,
        entry_reason: row.try_get("entry_reason")?,
        entry_rsi: opt_decimal_column(row, TABLE, "entry_rsi")?,
    };
    let journal = TradeJournal {
        exit_reason: row.try_get("exit_reason")?,
        exit_rsi: opt_decimal_column(row, TABLE, "exit_rsi")?,
        max_drawdown_pct: opt_decimal_column(row, TABLE, "max_drawdown_pct")?,
        emotional_state: row.try_get("emotional_state")?,
        conviction_level: row.try_get("conviction_level")?,
        market_conditions: row.try_get("market_conditions")?,
        what_went_right: row.try_get("what_went_right")?,
        what_went_wrong: row.try_get("what_went_wrong")?,
        trade_grade: row.try_get("trade_grade")?,
        strategy_tag: row.try_get("strategy_tag")?,
        notes: row.try_get("notes")?,
    };
    Ok(TradeHistory {
        id: row.try_get("id")?,
        cycle,
        journal,
        created_at: TimeMs::new(row.try_get("created_at")?),
    })
}
