//! Moving-average cost math and the unit-cost fallback chain.
//!
//! Kept free of persistence concerns so the arithmetic can be tested
//! independently of the mutation logic.

use rust_decimal::Decimal;

/// Resolves the unit cost for an inbound movement.
///
/// Ordered fallback: the caller-supplied cost wins when present and
/// non-negative, then the part catalog's cost, otherwise `None` (the
/// movement is recorded unpriced and the average is left untouched).
pub fn resolve_unit_cost(explicit: Option<Decimal>, catalog: Option<Decimal>) -> Option<Decimal> {
    explicit
        .filter(|c| !c.is_sign_negative())
        .or_else(|| catalog.filter(|c| !c.is_sign_negative()))
}

/// Valuation recorded on an outbound ledger entry.
///
/// Outbound movements never revise the cost basis; the entry carries the
/// balance's current average when one has been established, falling back
/// to the catalog cost for never-priced stock.
pub fn outbound_valuation(average_cost: Decimal, catalog: Option<Decimal>) -> Option<Decimal> {
    if average_cost > Decimal::ZERO {
        Some(average_cost)
    } else {
        catalog.filter(|c| !c.is_sign_negative())
    }
}

/// Recomputes the moving average after `quantity` units arrive at
/// `unit_cost` over a prior state of `on_hand_before` units at
/// `old_average`.
///
/// `max(1, new_on_hand)` guards the degenerate first movement of zero
/// quantity; no division by zero is possible.
pub fn weighted_average_cost(
    old_average: Decimal,
    on_hand_before: i64,
    unit_cost: Decimal,
    quantity: i64,
    new_on_hand: i64,
) -> Decimal {
    let base = Decimal::from(on_hand_before);
    let incoming = Decimal::from(quantity);
    let divisor = Decimal::from(new_on_hand.max(1));
    (old_average * base + unit_cost * incoming) / divisor
}
