//! Closed trading cycle with realized P&L, plus the hand-edited journal notes.

use crate::domain::{Decimal, Symbol, TimeMs};
use serde::{Deserialize, Serialize};

/// Permanent record of one open→close cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeHistory {
    pub id: i64,
    #[serde(flatten)]
    pub cycle: ClosedCycle,
    #[serde(flatten)]
    pub journal: TradeJournal,
    pub created_at: TimeMs,
}

/// Figures computed for a cycle at closure time, before they are stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedCycle {
    /// Id of the position row the cycle was held in. Executions keep this id
    /// after the row is deleted, which lets unlinked ones be matched later.
    pub position_id: i64,
    pub symbol: Symbol,
    /// Aggregate quantity bought over the cycle.
    pub quantity: Decimal,
    /// Weighted-average entry price of the position at closure.
    pub entry_price: Decimal,
    /// Average exit price over all sells of the cycle.
    pub exit_price: Decimal,
    /// Total cost of all buys.
    pub total_cost: Decimal,
    /// Fees across every execution of the cycle.
    pub fees: Decimal,
    pub entry_date: TimeMs,
    pub exit_date: TimeMs,
    pub holding_period_hours: i64,
    pub realized_pnl: Decimal,
    pub realized_pnl_pct: Decimal,
    pub entry_reason: Option<String>,
    pub entry_rsi: Option<Decimal>,
}

impl ClosedCycle {
    pub fn is_win(&self) -> bool {
        self.realized_pnl.is_positive()
    }

    pub fn is_loss(&self) -> bool {
        self.realized_pnl.is_negative()
    }
}

/// Post-trade review notes. Empty when the cycle is archived, filled in later.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeJournal {
    pub exit_reason: Option<String>,
    pub exit_rsi: Option<Decimal>,
    pub max_drawdown_pct: Option<Decimal>,
    /// Self-rated, 1 to 10.
    pub emotional_state: Option<i64>,
    /// Self-rated, 1 to 10.
    pub conviction_level: Option<i64>,
    pub market_conditions: Option<String>,
    pub what_went_right: Option<String>,
    pub what_went_wrong: Option<String>,
    pub trade_grade: Option<String>,
    pub strategy_tag: Option<String>,
    pub notes: Option<String>,
}
