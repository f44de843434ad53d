use rust_decimal::Decimal;

use crate::inventory::models::PurchaseLot;

/// Weighted-average unit price of a set of purchase lots
///
/// Lots with stock left are weighted by their remaining quantity; lots that
/// predate remaining tracking are weighted by the purchased quantity. When
/// every tracked lot is used up the purchased quantities are used instead, so
/// the last known cost survives a stock-out. Returns `None` when no lot has a
/// positive weight.
pub fn weighted_average(lots: &[PurchaseLot]) -> Option<Decimal> {
    let live = lots.iter().filter_map(|lot| match lot.remaining {
        Some(remaining) if remaining > Decimal::ZERO => Some((remaining, lot.unit_price)),
        Some(_) => None,
        None => Some((lot.quantity, lot.unit_price)),
    });

    average(live).or_else(|| average(lots.iter().map(|lot| (lot.quantity, lot.unit_price))))
}

fn average(weighted: impl Iterator<Item = (Decimal, Decimal)>) -> Option<Decimal> {
    let (value, weight) = weighted
        .filter(|(weight, _)| *weight > Decimal::ZERO)
        .fold((Decimal::ZERO, Decimal::ZERO), |(value, weight), (w, price)| {
            (value + w * price, weight + w)
        });

    if weight.is_zero() {
        None
    } else {
        Some(value / weight)
    }
}

/// Plan a FIFO consumption of `quantity` across `lots`
///
/// `lots` must already be ordered oldest first. Returns `(lot_id, taken)`
/// pairs; when the lots hold less than `quantity` the plan covers what is left.
pub fn consume_fifo(lots: &[PurchaseLot], quantity: Decimal) -> Vec<(i64, Decimal)> {
    let mut outstanding = quantity;
    let mut plan = Vec::new();

    for lot in lots {
        if outstanding <= Decimal::ZERO {
            break;
        }
        let available = lot.remaining.unwrap_or(lot.quantity);
        if available <= Decimal::ZERO {
            continue;
        }
        let taken = available.min(outstanding);
        plan.push((lot.id, taken));
        outstanding -= taken;
    }

    plan
}
