use sea_orm::error::DbErr;
use thiserror::Error;
use uuid::Uuid;

/// Error taxonomy of the stock ledger engine.
///
/// The domain variants (`InvalidReference`, `InvalidMovementType`,
/// `InsufficientStock`, `InsufficientReservation`, `NegativeStock`) are
/// local, recoverable-by-caller conditions: the attempted unit of work is
/// discarded in full and nothing is persisted. `DatabaseError` is the
/// distinct "storage unavailable" condition; the ledger performs no
/// retries of it.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("invalid reference: {0}")]
    InvalidReference(String),

    #[error("invalid movement type: {0}")]
    InvalidMovementType(String),

    #[error(
        "insufficient stock for part {part_id} at location {location_id}: \
         requested {requested}, available {available}"
    )]
    InsufficientStock {
        part_id: Uuid,
        location_id: Uuid,
        requested: i64,
        available: i64,
    },

    #[error(
        "insufficient reservation for part {part_id} at location {location_id}: \
         requested {requested}, reserved {reserved}"
    )]
    InsufficientReservation {
        part_id: Uuid,
        location_id: Uuid,
        requested: i64,
        reserved: i64,
    },

    #[error(
        "movement would drive stock negative for part {part_id} at location {location_id}: \
         on_hand {on_hand}, available {available}"
    )]
    NegativeStock {
        part_id: Uuid,
        location_id: Uuid,
        on_hand: i64,
        available: i64,
    },

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("concurrent modification of stock for part {part_id} at location {location_id}")]
    ConcurrentModification { part_id: Uuid, location_id: Uuid },

    #[error("event error: {0}")]
    EventError(String),
}

impl ServiceError {
    pub fn db_error(error: DbErr) -> Self {
        ServiceError::DatabaseError(error)
    }

    /// Stable label for failure metrics.
    pub fn metric_label(&self) -> &'static str {
        match self {
            ServiceError::DatabaseError(_) => "database_error",
            ServiceError::InvalidReference(_) => "invalid_reference",
            ServiceError::InvalidMovementType(_) => "invalid_movement_type",
            ServiceError::InsufficientStock { .. } => "insufficient_stock",
            ServiceError::InsufficientReservation { .. } => "insufficient_reservation",
            ServiceError::NegativeStock { .. } => "negative_stock",
            ServiceError::ValidationError(_) => "validation_error",
            ServiceError::ConcurrentModification { .. } => "concurrent_modification",
            ServiceError::EventError(_) => "event_error",
        }
    }
}
