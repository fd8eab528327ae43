//! Movement model and the pure balance transitions.
//!
//! Each movement type is a tagged variant carrying only the fields that
//! type uses, so a magnitude-only adjustment or a priced issue cannot be
//! expressed at all. The transition functions take and return plain
//! balance state; the engine owns persistence around them.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::entities::ledger_entry::MovementType;
use crate::errors::ServiceError;
use crate::services::costing::{outbound_valuation, resolve_unit_cost, weighted_average_cost};

/// Identity of one stock balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BalanceKey {
    pub company_id: Uuid,
    pub part_id: Uuid,
    pub location_id: Uuid,
}

impl BalanceKey {
    pub fn new(company_id: Uuid, part_id: Uuid, location_id: Uuid) -> Self {
        Self {
            company_id,
            part_id,
            location_id,
        }
    }
}

/// One stock-affecting movement.
///
/// `Adjustment` takes a signed `delta` and nothing else; the quantity of
/// every other variant is a non-negative magnitude.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StockMovement {
    Receipt {
        quantity: i64,
        unit_cost: Option<Decimal>,
    },
    Issue {
        quantity: i64,
    },
    Adjustment {
        delta: i64,
    },
    TransferOut {
        quantity: i64,
    },
    TransferIn {
        quantity: i64,
        unit_cost: Option<Decimal>,
    },
    Return {
        quantity: i64,
        unit_cost: Option<Decimal>,
    },
}

impl StockMovement {
    pub fn movement_type(&self) -> MovementType {
        match self {
            StockMovement::Receipt { .. } => MovementType::Receipt,
            StockMovement::Issue { .. } => MovementType::Issue,
            StockMovement::Adjustment { .. } => MovementType::Adjustment,
            StockMovement::TransferOut { .. } => MovementType::TransferOut,
            StockMovement::TransferIn { .. } => MovementType::TransferIn,
            StockMovement::Return { .. } => MovementType::Return,
        }
    }

    /// Caller-supplied unit cost, where the variant carries one.
    fn explicit_unit_cost(&self) -> Option<Decimal> {
        match self {
            StockMovement::Receipt { unit_cost, .. }
            | StockMovement::TransferIn { unit_cost, .. }
            | StockMovement::Return { unit_cost, .. } => *unit_cost,
            _ => None,
        }
    }
}

/// Caller-supplied context recorded on the ledger entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct MovementMeta {
    #[validate(length(max = 200))]
    pub reason: Option<String>,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
    #[validate(length(max = 100))]
    pub reference: Option<String>,
    #[validate(length(max = 50))]
    pub reference_type: Option<String>,
    pub related_id: Option<Uuid>,
    pub from_location_id: Option<Uuid>,
    pub to_location_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
}

/// Plain quantitative state of one balance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BalanceState {
    pub on_hand: i64,
    pub reserved: i64,
    pub available: i64,
    pub average_cost: Decimal,
}

impl BalanceState {
    pub fn empty() -> Self {
        Self {
            on_hand: 0,
            reserved: 0,
            available: 0,
            average_cost: Decimal::ZERO,
        }
    }

    /// True when the balance satisfies the ledger invariants.
    pub fn invariants_hold(&self) -> bool {
        self.on_hand >= 0
            && self.reserved >= 0
            && self.available >= 0
            && self.available == self.on_hand - self.reserved
    }
}

/// Computed outcome of applying one movement to a balance.
#[derive(Debug, Clone, PartialEq)]
pub struct MovementEffect {
    pub state: BalanceState,
    /// Quantity recorded on the ledger entry: the signed delta for an
    /// adjustment, the magnitude for every other type.
    pub entry_quantity: i64,
    /// Resolved unit cost recorded on the ledger entry.
    pub unit_cost: Option<Decimal>,
}

fn non_negative(quantity: i64, what: &str) -> Result<(), ServiceError> {
    if quantity < 0 {
        return Err(ServiceError::ValidationError(format!(
            "{} must be non-negative, got {}",
            what, quantity
        )));
    }
    Ok(())
}

/// Applies one movement to a balance, enforcing the ledger invariants.
///
/// `catalog_cost` is the part catalog's fallback unit cost. The returned
/// effect is only computed; persisting it is the engine's job.
pub fn apply_movement(
    key: &BalanceKey,
    current: &BalanceState,
    movement: &StockMovement,
    catalog_cost: Option<Decimal>,
) -> Result<MovementEffect, ServiceError> {
    let mut next = *current;
    let entry_quantity;
    let unit_cost;

    match movement {
        StockMovement::Receipt { quantity, .. }
        | StockMovement::TransferIn { quantity, .. }
        | StockMovement::Return { quantity, .. } => {
            non_negative(*quantity, "inbound quantity")?;
            next.on_hand = current.on_hand + quantity;
            next.available = current.available + quantity;
            unit_cost = resolve_unit_cost(movement.explicit_unit_cost(), catalog_cost);
            if let Some(cost) = unit_cost {
                next.average_cost = weighted_average_cost(
                    current.average_cost,
                    current.on_hand,
                    cost,
                    *quantity,
                    next.on_hand,
                );
            }
            entry_quantity = *quantity;
        }
        StockMovement::Issue { quantity } | StockMovement::TransferOut { quantity } => {
            non_negative(*quantity, "outbound quantity")?;
            if *quantity > current.available {
                return Err(ServiceError::InsufficientStock {
                    part_id: key.part_id,
                    location_id: key.location_id,
                    requested: *quantity,
                    available: current.available,
                });
            }
            next.on_hand = current.on_hand - quantity;
            next.available = current.available - quantity;
            unit_cost = outbound_valuation(current.average_cost, catalog_cost);
            entry_quantity = *quantity;
        }
        StockMovement::Adjustment { delta } => {
            next.on_hand = current.on_hand + delta;
            next.available = current.available + delta;
            if *delta > 0 {
                unit_cost = resolve_unit_cost(None, catalog_cost);
                if let Some(cost) = unit_cost {
                    next.average_cost = weighted_average_cost(
                        current.average_cost,
                        current.on_hand,
                        cost,
                        *delta,
                        next.on_hand,
                    );
                }
            } else {
                unit_cost = outbound_valuation(current.average_cost, catalog_cost);
            }
            entry_quantity = *delta;
        }
    }

    if next.on_hand < 0 || next.available < 0 {
        return Err(ServiceError::NegativeStock {
            part_id: key.part_id,
            location_id: key.location_id,
            on_hand: next.on_hand,
            available: next.available,
        });
    }

    debug_assert!(next.invariants_hold());

    Ok(MovementEffect {
        state: next,
        entry_quantity,
        unit_cost,
    })
}

/// Earmarks `quantity` units: `reserved` grows, `available` shrinks,
/// `on_hand` is untouched. Not a physical movement, so no ledger entry
/// is derived from this transition.
pub fn apply_reservation(
    key: &BalanceKey,
    current: &BalanceState,
    quantity: i64,
) -> Result<BalanceState, ServiceError> {
    non_negative(quantity, "reservation quantity")?;
    if quantity > current.available {
        return Err(ServiceError::InsufficientStock {
            part_id: key.part_id,
            location_id: key.location_id,
            requested: quantity,
            available: current.available,
        });
    }
    let next = BalanceState {
        reserved: current.reserved + quantity,
        available: current.available - quantity,
        ..*current
    };
    debug_assert!(next.invariants_hold());
    Ok(next)
}

/// Returns `quantity` earmarked units to the available pool.
pub fn apply_release(
    key: &BalanceKey,
    current: &BalanceState,
    quantity: i64,
) -> Result<BalanceState, ServiceError> {
    non_negative(quantity, "release quantity")?;
    if quantity > current.reserved {
        return Err(ServiceError::InsufficientReservation {
            part_id: key.part_id,
            location_id: key.location_id,
            requested: quantity,
            reserved: current.reserved,
        });
    }
    let next = BalanceState {
        reserved: current.reserved - quantity,
        available: current.available + quantity,
        ..*current
    };
    debug_assert!(next.invariants_hold());
    Ok(next)
}
