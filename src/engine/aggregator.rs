//! Position state machine: folds one execution into a symbol's open position.

use crate::domain::{Decimal, DecimalOverflow, Execution, NewPosition, Position, Side};

use super::Transition;

/// Decide how `exec` changes the position currently held for its symbol.
///
/// `current` is `None` in the ABSENT state. The function is pure; callers
/// apply the returned transition to the store.
///
/// # Errors
/// Returns `DecimalOverflow` when the new quantity or average price is out of range.
pub fn transition(current: Option<&Position>, exec: &Execution) -> Result<Transition, DecimalOverflow> {
    let t = match (exec.side, current) {
        (Side::Buy, None) => Transition::Open(NewPosition::new(
            exec.symbol.clone(),
            exec.quantity,
            exec.price,
            exec.executed_at,
        )),
        (Side::Buy, Some(position)) => Transition::Increase {
            quantity: position.quantity.checked_add(exec.quantity)?,
            entry_price: weighted_average(
                position.quantity,
                position.entry_price,
                exec.quantity,
                exec.price,
            )?,
        },
        (Side::Sell, None) => Transition::SellWithoutPosition,
        (Side::Sell, Some(position)) => {
            let remaining = position.quantity.checked_sub(exec.quantity)?;
            if remaining.is_positive() {
                Transition::Reduce {
                    quantity: remaining,
                }
            } else {
                Transition::Close {
                    oversold: remaining.abs(),
                }
            }
        }
    };
    Ok(t)
}

/// `(old_qty*old_price + add_qty*add_price) / (old_qty + add_qty)`.
pub fn weighted_average(
    old_qty: Decimal,
    old_price: Decimal,
    add_qty: Decimal,
    add_price: Decimal,
) -> Result<Decimal, DecimalOverflow> {
    let total_qty = old_qty.checked_add(add_qty)?;
    let total_cost = old_qty
        .checked_mul(old_price)?
        .checked_add(add_qty.checked_mul(add_price)?)?;
    total_cost.div_or_zero(total_qty)
}
