//! Open position operations for the repository.
//!
//! Updates and deletes are conditional on the `version` the caller read, so a
//! concurrent writer surfaces as `RepoError::Conflict` instead of a lost update.

use crate::domain::{Decimal, NewPosition, Position, Symbol, TimeMs};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{decimal_column, is_unique_violation, opt_decimal_column, RepoError, Repository};

const POSITION_COLUMNS: &str = "id, symbol, quantity, entry_price, entry_date, sector, \
     entry_reason, entry_rsi, version, created_at, updated_at";

impl Repository {
    /// Get the open position for a symbol, if any.
    pub async fn get_position(&self, symbol: &Symbol) -> Result<Option<Position>, RepoError> {
        let sql = format!("SELECT {} FROM positions WHERE symbol = ?", POSITION_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(symbol.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(position_from_row).transpose()
    }

    pub async fn get_position_by_id(&self, id: i64) -> Result<Option<Position>, RepoError> {
        let sql = format!("SELECT {} FROM positions WHERE id = ?", POSITION_COLUMNS);
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(position_from_row).transpose()
    }

    /// All open positions, oldest entry first.
    pub async fn list_positions(&self) -> Result<Vec<Position>, RepoError> {
        let sql = format!(
            "SELECT {} FROM positions ORDER BY entry_date ASC, id ASC",
            POSITION_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(position_from_row).collect()
    }

    /// Insert a new open position.
    ///
    /// # Errors
    /// Returns `RepoError::Conflict` if a position for the symbol already exists.
    pub async fn create_position(&self, new: &NewPosition) -> Result<Position, RepoError> {
        let now = TimeMs::now();
        let result = sqlx::query(
            r#"
            INSERT INTO positions
            (symbol, quantity, entry_price, entry_date, sector, entry_reason, entry_rsi, version, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(new.symbol.as_str())
        .bind(new.quantity.to_canonical_string())
        .bind(new.entry_price.to_canonical_string())
        .bind(new.entry_date.as_ms())
        .bind(new.sector.as_deref())
        .bind(new.entry_reason.as_deref())
        .bind(new.entry_rsi.map(|d| d.to_canonical_string()))
        .bind(now.as_ms())
        .bind(now.as_ms())
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => Ok(Position {
                id: done.last_insert_rowid(),
                symbol: new.symbol.clone(),
                quantity: new.quantity,
                entry_price: new.entry_price,
                entry_date: new.entry_date,
                sector: new.sector.clone(),
                entry_reason: new.entry_reason.clone(),
                entry_rsi: new.entry_rsi,
                version: 0,
                created_at: now,
                updated_at: now,
            }),
            Err(e) if is_unique_violation(&e) => Err(RepoError::Conflict {
                symbol: new.symbol.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Set quantity and entry price on a position read at `current.version`.
    ///
    /// # Errors
    /// Returns `RepoError::Conflict` if the row changed or vanished since it was read.
    pub async fn update_position(
        &self,
        current: &Position,
        quantity: Decimal,
        entry_price: Decimal,
    ) -> Result<Position, RepoError> {
        let now = TimeMs::now();
        let result = sqlx::query(
            r#"
            UPDATE positions
            SET quantity = ?, entry_price = ?, version = version + 1, updated_at = ?
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(quantity.to_canonical_string())
        .bind(entry_price.to_canonical_string())
        .bind(now.as_ms())
        .bind(current.id)
        .bind(current.version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepoError::Conflict {
                symbol: current.symbol.to_string(),
            });
        }

        Ok(Position {
            quantity,
            entry_price,
            version: current.version + 1,
            updated_at: now,
            ..current.clone()
        })
    }

    /// Delete a position read at `current.version`.
    ///
    /// # Errors
    /// Returns `RepoError::Conflict` if the row changed or vanished since it was read.
    pub async fn delete_position(&self, current: &Position) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM positions WHERE id = ? AND version = ?")
            .bind(current.id)
            .bind(current.version)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepoError::Conflict {
                symbol: current.symbol.to_string(),
            });
        }
        Ok(())
    }
}

fn position_from_row(row: &SqliteRow) -> Result<Position, RepoError> {
    const TABLE: &str = "positions";
    Ok(Position {
        id: row.try_get("id")?,
        symbol: Symbol::new(row.try_get::<String, _>("symbol")?),
        quantity: decimal_column(row, TABLE, "quantity")?,
        entry_price: decimal_column(row, TABLE, "entry_price")?,
        entry_date: TimeMs::new(row.try_get("entry_date")?),
        sector: row.try_get("sector")?,
        entry_reason: row.try_get("entry_reason")?,
        entry_rsi: opt_decimal_column(row, TABLE, "entry_rsi")?,
        version: row.try_get("version")?,
        created_at: TimeMs::new(row.try_get("created_at")?),
        updated_at: TimeMs::new(row.try_get("updated_at")?),
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::setup_test_db;
    use super::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn new_position(symbol: &str, qty: &str, price: &str) -> NewPosition {
        NewPosition::new(Symbol::new(symbol), d(qty), d(price), TimeMs::new(1_000))
    }

    #[tokio::test]
    async fn test_create_and_get_position() {
        let (repo, _temp) = setup_test_db().await;
        let mut new = new_position("SLV", "3", "72.03");
        new.entry_reason = Some("rsi oversold".to_string());
        new.entry_rsi = Some(d("28.5"));

        let created = repo.create_position(&new).await.unwrap();
        let fetched = repo.get_position(&Symbol::new("SLV")).await.unwrap().unwrap();

        assert_eq!(fetched, created);
        assert_eq!(fetched.version, 0);
        assert_eq!(fetched.entry_rsi, Some(d("28.5")));
        assert_eq!(
            repo.get_position_by_id(created.id).await.unwrap(),
            Some(created)
        );
        assert!(repo.get_position(&Symbol::new("AAPL")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_position_for_symbol_conflicts() {
        let (repo, _temp) = setup_test_db().await;
        repo.create_position(&new_position("SLV", "1", "10"))
            .await
            .unwrap();

        let err = repo
            .create_position(&new_position("SLV", "2", "11"))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_update_bumps_version() {
        let (repo, _temp) = setup_test_db().await;
        let p = repo
            .create_position(&new_position("SLV", "1", "10"))
            .await
            .unwrap();

        let updated = repo.update_position(&p, d("3"), d("11")).await.unwrap();
        assert_eq!(updated.version, 1);

        let fetched = repo.get_position(&p.symbol).await.unwrap().unwrap();
        assert_eq!(fetched.quantity, d("3"));
        assert_eq!(fetched.entry_price, d("11"));
        assert_eq!(fetched.version, 1);
    }

    #[tokio::test]
    async fn test_stale_update_conflicts() {
        let (repo, _temp) = setup_test_db().await;
        let stale = repo
            .create_position(&new_position("SLV", "1", "10"))
            .await
            .unwrap();
        repo.update_position(&stale, d("2"), d("10")).await.unwrap();

        let err = repo
            .update_position(&stale, d("5"), d("10"))
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        let fetched = repo.get_position(&stale.symbol).await.unwrap().unwrap();
        assert_eq!(fetched.quantity, d("2"));
    }

    #[tokio::test]
    async fn test_delete_position() {
        let (repo, _temp) = setup_test_db().await;
        let p = repo
            .create_position(&new_position("SLV", "1", "10"))
            .await
            .unwrap();

        repo.delete_position(&p).await.unwrap();
        assert!(repo.get_position(&p.symbol).await.unwrap().is_none());

        let err = repo.delete_position(&p).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_list_positions_by_entry_date() {
        let (repo, _temp) = setup_test_db().await;
        let mut later = new_position("AAPL", "1", "150");
        later.entry_date = TimeMs::new(5_000);
        repo.create_position(&later).await.unwrap();
        repo.create_position(&new_position("SLV", "1", "10"))
            .await
            .unwrap();

        let symbols: Vec<String> = repo
            .list_positions()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.symbol.0)
            .collect();
        assert_eq!(symbols, vec!["SLV", "AAPL"]);
    }
}
