//! Aggregate statistics over the trade journal.

use crate::domain::{ClosedCycle, Decimal, DecimalOverflow};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct TradeStats {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Winners as a percentage of all trades.
    pub win_rate: Decimal,
    pub total_pnl: Decimal,
    pub avg_pnl_pct: Decimal,
    pub avg_win: Decimal,
    pub avg_loss: Decimal,
}

impl TradeStats {
    pub fn from_cycles<'a, I>(cycles: I) -> Result<Self, DecimalOverflow>
    where
        I: IntoIterator<Item = &'a ClosedCycle>,
    {
        let mut stats = TradeStats::default();
        let mut pnl_pct_sum = Decimal::zero();
        let mut win_sum = Decimal::zero();
        let mut loss_sum = Decimal::zero();

        for cycle in cycles {
            stats.total_trades += 1;
            stats.total_pnl = stats.total_pnl.checked_add(cycle.realized_pnl)?;
            pnl_pct_sum = pnl_pct_sum.checked_add(cycle.realized_pnl_pct)?;
            if cycle.is_win() {
                stats.winning_trades += 1;
                win_sum = win_sum.checked_add(cycle.realized_pnl)?;
            } else if cycle.is_loss() {
                stats.losing_trades += 1;
                loss_sum = loss_sum.checked_add(cycle.realized_pnl)?;
            }
        }

        let count = |n: usize| Decimal::from(n as i64);
        stats.avg_pnl_pct = pnl_pct_sum.div_or_zero(count(stats.total_trades))?;
        stats.avg_win = win_sum.div_or_zero(count(stats.winning_trades))?;
        stats.avg_loss = loss_sum.div_or_zero(count(stats.losing_trades))?;
        stats.win_rate = count(stats.winning_trades)
            .checked_mul(Decimal::hundred())?
            .div_or_zero(count(stats.total_trades))?;
        Ok(stats)
    }
}
