use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// The closed set of stock movement types the ledger records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum MovementType {
    #[sea_orm(string_value = "receipt")]
    Receipt,
    #[sea_orm(string_value = "issue")]
    Issue,
    #[sea_orm(string_value = "adjustment")]
    Adjustment,
    #[sea_orm(string_value = "transfer_out")]
    TransferOut,
    #[sea_orm(string_value = "transfer_in")]
    TransferIn,
    #[sea_orm(string_value = "return")]
    Return,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Receipt => "receipt",
            MovementType::Issue => "issue",
            MovementType::Adjustment => "adjustment",
            MovementType::TransferOut => "transfer_out",
            MovementType::TransferIn => "transfer_in",
            MovementType::Return => "return",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "receipt" => Some(MovementType::Receipt),
            "issue" => Some(MovementType::Issue),
            "adjustment" => Some(MovementType::Adjustment),
            "transfer_out" => Some(MovementType::TransferOut),
            "transfer_in" => Some(MovementType::TransferIn),
            "return" => Some(MovementType::Return),
            _ => None,
        }
    }

    /// Parses a movement name arriving from a stringly-typed edge
    /// (HTTP payloads, CSV imports). Unknown names are the
    /// `InvalidMovementType` failure.
    pub fn parse(s: &str) -> Result<Self, crate::errors::ServiceError> {
        Self::from_str(s).ok_or_else(|| crate::errors::ServiceError::InvalidMovementType(s.to_string()))
    }

    /// Inbound movements add stock and may revise the moving-average cost.
    pub fn is_inbound(&self) -> bool {
        matches!(
            self,
            MovementType::Receipt | MovementType::TransferIn | MovementType::Return
        )
    }
}

/// One immutable record of a stock-affecting event.
///
/// Rows are created once and never mutated or deleted; together they form
/// the audit trail from which any balance can be reconstructed. `quantity`
/// is a signed delta for `adjustment` entries and a magnitude otherwise.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ledger_entries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub company_id: Uuid,
    pub part_id: Uuid,
    pub location_id: Uuid,
    pub entry_type: MovementType,
    pub quantity: i64,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub unit_cost: Option<Decimal>,
    /// Derived `unit_cost * |quantity|` when a unit cost is present.
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub total_cost: Option<Decimal>,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub reference: Option<String>,
    /// Linkage for compound operations: a transfer produces two entries
    /// sharing `related_id` and `reference_type = "transfer"`.
    pub from_location_id: Option<Uuid>,
    pub to_location_id: Option<Uuid>,
    pub related_id: Option<Uuid>,
    pub reference_type: Option<String>,
    pub user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::part::Entity",
        from = "Column::PartId",
        to = "super::part::Column::Id"
    )]
    Part,
}

impl Related<super::part::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Part.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Signed effect of this entry on `on_hand` at its location.
    pub fn signed_quantity(&self) -> i64 {
        match self.entry_type {
            MovementType::Receipt | MovementType::TransferIn | MovementType::Return => {
                self.quantity
            }
            MovementType::Issue | MovementType::TransferOut => -self.quantity,
            MovementType::Adjustment => self.quantity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movement_type_round_trips_through_strings() {
        for ty in [
            MovementType::Receipt,
            MovementType::Issue,
            MovementType::Adjustment,
            MovementType::TransferOut,
            MovementType::TransferIn,
            MovementType::Return,
        ] {
            assert_eq!(MovementType::from_str(ty.as_str()), Some(ty));
        }
        assert_eq!(MovementType::from_str("cycle_count"), None);
    }

    #[test]
    fn unknown_movement_names_fail_to_parse() {
        assert!(MovementType::parse("receipt").is_ok());
        let err = MovementType::parse("restock").unwrap_err();
        assert!(matches!(
            err,
            crate::errors::ServiceError::InvalidMovementType(_)
        ));
    }

    #[test]
    fn signed_quantity_follows_direction() {
        let entry = Model {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            part_id: Uuid::new_v4(),
            location_id: Uuid::new_v4(),
            entry_type: MovementType::Issue,
            quantity: 4,
            unit_cost: None,
            total_cost: None,
            reason: None,
            notes: None,
            reference: None,
            from_location_id: None,
            to_location_id: None,
            related_id: None,
            reference_type: None,
            user_id: None,
            created_at: Utc::now(),
        };
        assert_eq!(entry.signed_quantity(), -4);
        let adjustment = Model {
            entry_type: MovementType::Adjustment,
            quantity: -3,
            ..entry
        };
        assert_eq!(adjustment.signed_quantity(), -3);
    }
}
