//! Realized P&L for a fully closed cycle.

use crate::domain::{ClosedCycle, Decimal, DecimalOverflow, Execution, Position, Side};

/// Per-side totals over every execution of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleTotals {
    pub buy_qty: Decimal,
    pub buy_cost: Decimal,
    pub sell_qty: Decimal,
    pub sell_revenue: Decimal,
    pub fees: Decimal,
}

impl CycleTotals {
    pub fn from_executions<'a, I>(executions: I) -> Result<Self, DecimalOverflow>
    where
        I: IntoIterator<Item = &'a Execution>,
    {
        let mut totals = CycleTotals::default();
        for exec in executions {
            match exec.side {
                Side::Buy => {
                    totals.buy_qty = totals.buy_qty.checked_add(exec.quantity)?;
                    totals.buy_cost = totals.buy_cost.checked_add(exec.total_notional)?;
                }
                Side::Sell => {
                    totals.sell_qty = totals.sell_qty.checked_add(exec.quantity)?;
                    totals.sell_revenue = totals.sell_revenue.checked_add(exec.total_notional)?;
                }
            }
            totals.fees = totals.fees.checked_add(exec.fees)?;
        }
        Ok(totals)
    }

    /// `sell_revenue - buy_cost - fees`.
    pub fn realized_pnl(&self) -> Result<Decimal, DecimalOverflow> {
        self.sell_revenue
            .checked_sub(self.buy_cost)?
            .checked_sub(self.fees)
    }

    /// Realized P&L as a percentage of buy cost; zero when nothing was bought.
    pub fn realized_pnl_pct(&self) -> Result<Decimal, DecimalOverflow> {
        self.realized_pnl()?
            .checked_mul(Decimal::hundred())?
            .div_or_zero(self.buy_cost)
    }

    pub fn avg_exit_price(&self) -> Result<Decimal, DecimalOverflow> {
        self.sell_revenue.div_or_zero(self.sell_qty)
    }
}

/// Build the trade-history figures for `position`, closed by `closing`.
///
/// `cycle` must hold every execution of the cycle, the closing one included,
/// each exactly once.
pub fn close_cycle<'a, I>(
    position: &Position,
    cycle: I,
    closing: &Execution,
) -> Result<ClosedCycle, DecimalOverflow>
where
    I: IntoIterator<Item = &'a Execution>,
{
    let totals = CycleTotals::from_executions(cycle)?;

    Ok(ClosedCycle {
        position_id: position.id,
        symbol: position.symbol.clone(),
        quantity: totals.buy_qty,
        entry_price: position.entry_price,
        exit_price: totals.avg_exit_price()?,
        total_cost: totals.buy_cost,
        fees: totals.fees,
        entry_date: position.entry_date,
        exit_date: closing.executed_at,
        holding_period_hours: closing.executed_at.hours_since(position.entry_date),
        realized_pnl: totals.realized_pnl()?,
        realized_pnl_pct: totals.realized_pnl_pct()?,
        entry_reason: position.entry_reason.clone(),
        entry_rsi: position.entry_rsi,
    })
}
