//! The stock ledger engine: sole writer of `stock_balances` and
//! `ledger_entries`.
//!
//! Every operation runs as one database transaction with an optimistic
//! version check on the balance row, so concurrent mutations of the same
//! (company, part, location) triple serialize: the losing writer's
//! attempt is retried against fresh state a bounded number of times.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec, Opts};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionError, TransactionTrait,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::entities::{
    ledger_entry::{self, MovementType},
    part::{self, Entity as Parts},
    stock_balance::{self, Entity as StockBalances},
    stock_location::{self, Entity as StockLocations},
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::movement::{
    self, BalanceKey, BalanceState, MovementEffect, MovementMeta, StockMovement,
};

const TRANSFER_REFERENCE: &str = "transfer";
const PHYSICAL_COUNT_REASON: &str = "Physical Count";

/// Attempts per operation before a version conflict surfaces as
/// `ConcurrentModification`.
const VERSION_CONFLICT_RETRIES: u32 = 3;

lazy_static! {
    static ref STOCK_MOVEMENTS: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "stock_ledger_movements_total",
            "Total number of committed stock movements"
        ),
        &["type"]
    )
    .expect("metric can be created");
    static ref STOCK_MOVEMENT_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "stock_ledger_movement_failures_total",
            "Total number of rejected stock movements"
        ),
        &["error_type"]
    )
    .expect("metric can be created");
    static ref STOCK_TRANSFERS: IntCounter = IntCounter::new(
        "stock_ledger_transfers_total",
        "Total number of completed stock transfers"
    )
    .expect("metric can be created");
    static ref STOCK_COUNTS: IntCounter = IntCounter::new(
        "stock_ledger_stock_counts_total",
        "Total number of performed stock counts"
    )
    .expect("metric can be created");
}

/// Result of a physical stock count.
#[derive(Debug, Clone)]
pub struct StockCount {
    pub balance: stock_balance::Model,
    /// `counted_quantity - on_hand` at the time of the count.
    pub delta: i64,
    /// The adjustment entry, absent when the count matched the book
    /// quantity.
    pub entry: Option<ledger_entry::Model>,
}

struct MovementOutcome {
    balance: stock_balance::Model,
    entry: ledger_entry::Model,
}

struct CountStamp {
    at: DateTime<Utc>,
    by: Option<Uuid>,
}

/// Service owning all mutations of stock balances and the movement
/// history.
#[derive(Clone)]
pub struct StockLedgerService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl StockLedgerService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Applies one movement to the balance identified by `key` and
    /// appends the matching ledger entry, atomically.
    #[instrument(skip(self, meta))]
    pub async fn adjust_stock(
        &self,
        key: BalanceKey,
        movement: StockMovement,
        meta: MovementMeta,
    ) -> Result<ledger_entry::Model, ServiceError> {
        meta.validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let outcome = self
            .run_movement(key, movement, meta)
            .await
            .map_err(record_failure)?;

        STOCK_MOVEMENTS
            .with_label_values(&[outcome.entry.entry_type.as_str()])
            .inc();
        info!(
            part_id = %key.part_id,
            location_id = %key.location_id,
            entry_type = outcome.entry.entry_type.as_str(),
            quantity = outcome.entry.quantity,
            on_hand = outcome.balance.on_hand,
            "Stock adjusted"
        );
        self.emit(Event::StockAdjusted {
            company_id: key.company_id,
            part_id: key.part_id,
            location_id: key.location_id,
            entry_type: outcome.entry.entry_type,
            quantity: outcome.entry.quantity,
            on_hand: outcome.balance.on_hand,
            available: outcome.balance.available,
            entry_id: outcome.entry.id,
        })
        .await;

        Ok(outcome.entry)
    }

    /// Moves `quantity` units of a part between two locations of the same
    /// company as one atomic unit: a `transfer_out` leg followed by a
    /// `transfer_in` leg, linked through a shared `related_id`.
    ///
    /// Without an explicit `unit_cost` the inbound leg is priced at the
    /// source balance's average cost at the time of the call, preserving
    /// cost continuity across the move.
    #[instrument(skip(self, meta))]
    pub async fn transfer(
        &self,
        company_id: Uuid,
        part_id: Uuid,
        from_location_id: Uuid,
        to_location_id: Uuid,
        quantity: i64,
        unit_cost: Option<Decimal>,
        meta: MovementMeta,
    ) -> Result<(ledger_entry::Model, ledger_entry::Model), ServiceError> {
        meta.validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        if from_location_id == to_location_id {
            return Err(record_failure(ServiceError::ValidationError(
                "cannot transfer stock to the same location".to_string(),
            )));
        }

        let transfer_id = meta.related_id.unwrap_or_else(Uuid::new_v4);

        let mut attempts = 0;
        let (out, inbound) = loop {
            let meta = meta.clone();
            let result = self
                .db
                .transaction::<_, (MovementOutcome, MovementOutcome), ServiceError>(move |txn| {
                    Box::pin(async move {
                        apply_transfer_in_txn(
                            txn,
                            company_id,
                            part_id,
                            from_location_id,
                            to_location_id,
                            quantity,
                            unit_cost,
                            &meta,
                            transfer_id,
                        )
                        .await
                    })
                })
                .await;
            match unwrap_txn_error(result) {
                Err(ServiceError::ConcurrentModification { .. })
                    if attempts < VERSION_CONFLICT_RETRIES =>
                {
                    attempts += 1;
                    warn!(
                        part_id = %part_id,
                        from_location_id = %from_location_id,
                        to_location_id = %to_location_id,
                        attempt = attempts,
                        "Retrying transfer after version conflict"
                    );
                }
                Err(e) => return Err(record_failure(e)),
                Ok(pair) => break pair,
            }
        };

        STOCK_TRANSFERS.inc();
        STOCK_MOVEMENTS
            .with_label_values(&[MovementType::TransferOut.as_str()])
            .inc();
        STOCK_MOVEMENTS
            .with_label_values(&[MovementType::TransferIn.as_str()])
            .inc();
        info!(
            part_id = %part_id,
            from_location_id = %from_location_id,
            to_location_id = %to_location_id,
            quantity = quantity,
            "Stock transferred"
        );
        self.emit(Event::StockTransferred {
            company_id,
            part_id,
            from_location_id,
            to_location_id,
            quantity,
            transfer_id,
        })
        .await;

        Ok((out.entry, inbound.entry))
    }

    /// Earmarks `quantity` units against future use. Reservation is not a
    /// physical movement, so only the balance row changes; no ledger
    /// entry is appended.
    #[instrument(skip(self))]
    pub async fn reserve_stock(
        &self,
        key: BalanceKey,
        quantity: i64,
    ) -> Result<stock_balance::Model, ServiceError> {
        let balance = self
            .run_reservation(key, quantity, false)
            .await
            .map_err(record_failure)?;

        info!(
            part_id = %key.part_id,
            location_id = %key.location_id,
            quantity = quantity,
            available = balance.available,
            "Stock reserved"
        );
        self.emit(Event::StockReserved {
            company_id: key.company_id,
            part_id: key.part_id,
            location_id: key.location_id,
            quantity,
            available: balance.available,
        })
        .await;

        Ok(balance)
    }

    /// Returns previously reserved units to the available pool.
    #[instrument(skip(self))]
    pub async fn release_reserved_stock(
        &self,
        key: BalanceKey,
        quantity: i64,
    ) -> Result<stock_balance::Model, ServiceError> {
        let balance = self
            .run_reservation(key, quantity, true)
            .await
            .map_err(record_failure)?;

        info!(
            part_id = %key.part_id,
            location_id = %key.location_id,
            quantity = quantity,
            available = balance.available,
            "Reserved stock released"
        );
        self.emit(Event::StockReleased {
            company_id: key.company_id,
            part_id: key.part_id,
            location_id: key.location_id,
            quantity,
            available: balance.available,
        })
        .await;

        Ok(balance)
    }

    /// Reconciles the book quantity against a physical count.
    ///
    /// A matching count refreshes the count audit fields without writing
    /// a ledger entry; any discrepancy goes through the adjustment path
    /// with reason `"Physical Count"`, including shrinkage (a negative
    /// delta).
    #[instrument(skip(self, meta))]
    pub async fn perform_stock_count(
        &self,
        key: BalanceKey,
        counted_quantity: i64,
        counted_by: Option<Uuid>,
        meta: MovementMeta,
    ) -> Result<StockCount, ServiceError> {
        meta.validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        if counted_quantity < 0 {
            return Err(record_failure(ServiceError::ValidationError(format!(
                "counted quantity must be non-negative, got {}",
                counted_quantity
            ))));
        }

        let mut attempts = 0;
        let (balance, delta, entry) = loop {
            let meta = meta.clone();
            let result = self
                .db
                .transaction::<_, (stock_balance::Model, i64, Option<ledger_entry::Model>), ServiceError>(
                    move |txn| {
                        Box::pin(async move {
                            apply_count_in_txn(txn, &key, counted_quantity, counted_by, &meta).await
                        })
                    },
                )
                .await;
            match unwrap_txn_error(result) {
                Err(ServiceError::ConcurrentModification { .. })
                    if attempts < VERSION_CONFLICT_RETRIES =>
                {
                    attempts += 1;
                    warn!(
                        part_id = %key.part_id,
                        location_id = %key.location_id,
                        attempt = attempts,
                        "Retrying stock count after version conflict"
                    );
                }
                Err(e) => return Err(record_failure(e)),
                Ok(outcome) => break outcome,
            }
        };

        STOCK_COUNTS.inc();
        if let Some(entry) = &entry {
            STOCK_MOVEMENTS
                .with_label_values(&[entry.entry_type.as_str()])
                .inc();
        }
        info!(
            part_id = %key.part_id,
            location_id = %key.location_id,
            counted_quantity = counted_quantity,
            delta = delta,
            "Stock count performed"
        );
        self.emit(Event::StockCounted {
            company_id: key.company_id,
            part_id: key.part_id,
            location_id: key.location_id,
            counted_quantity,
            delta,
            counted_at: balance.last_counted_at.unwrap_or_else(Utc::now),
        })
        .await;

        Ok(StockCount {
            balance,
            delta,
            entry,
        })
    }

    async fn run_movement(
        &self,
        key: BalanceKey,
        movement: StockMovement,
        meta: MovementMeta,
    ) -> Result<MovementOutcome, ServiceError> {
        let mut attempts = 0;
        loop {
            let movement = movement.clone();
            let meta = meta.clone();
            let result = self
                .db
                .transaction::<_, MovementOutcome, ServiceError>(move |txn| {
                    Box::pin(
                        async move { apply_movement_in_txn(txn, &key, &movement, &meta).await },
                    )
                })
                .await;
            match unwrap_txn_error(result) {
                Err(ServiceError::ConcurrentModification { .. })
                    if attempts < VERSION_CONFLICT_RETRIES =>
                {
                    attempts += 1;
                    warn!(
                        part_id = %key.part_id,
                        location_id = %key.location_id,
                        attempt = attempts,
                        "Retrying stock movement after version conflict"
                    );
                }
                other => return other,
            }
        }
    }

    async fn run_reservation(
        &self,
        key: BalanceKey,
        quantity: i64,
        release: bool,
    ) -> Result<stock_balance::Model, ServiceError> {
        let mut attempts = 0;
        loop {
            let result = self
                .db
                .transaction::<_, stock_balance::Model, ServiceError>(move |txn| {
                    Box::pin(async move {
                        apply_reservation_in_txn(txn, &key, quantity, release).await
                    })
                })
                .await;
            match unwrap_txn_error(result) {
                Err(ServiceError::ConcurrentModification { .. })
                    if attempts < VERSION_CONFLICT_RETRIES =>
                {
                    attempts += 1;
                    warn!(
                        part_id = %key.part_id,
                        location_id = %key.location_id,
                        attempt = attempts,
                        "Retrying reservation after version conflict"
                    );
                }
                other => return other,
            }
        }
    }

    /// Events are a post-commit notification; delivery failure never
    /// fails the committed operation.
    async fn emit(&self, event: Event) {
        if let Err(e) = self.event_sender.send(event).await {
            warn!("Failed to publish stock ledger event: {}", e);
        }
    }
}

fn record_failure(error: ServiceError) -> ServiceError {
    STOCK_MOVEMENT_FAILURES
        .with_label_values(&[error.metric_label()])
        .inc();
    error
}

fn unwrap_txn_error<T>(result: Result<T, TransactionError<ServiceError>>) -> Result<T, ServiceError> {
    result.map_err(|e| match e {
        TransactionError::Connection(db_err) => ServiceError::DatabaseError(db_err),
        TransactionError::Transaction(service_err) => service_err,
    })
}

async fn load_owned_part<C: ConnectionTrait>(
    conn: &C,
    key: &BalanceKey,
) -> Result<part::Model, ServiceError> {
    Parts::find_by_id(key.part_id)
        .filter(part::Column::CompanyId.eq(key.company_id))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| {
            ServiceError::InvalidReference(format!(
                "part {} is not owned by company {}",
                key.part_id, key.company_id
            ))
        })
}

async fn ensure_owned_location<C: ConnectionTrait>(
    conn: &C,
    company_id: Uuid,
    location_id: Uuid,
) -> Result<(), ServiceError> {
    StockLocations::find_by_id(location_id)
        .filter(stock_location::Column::CompanyId.eq(company_id))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| {
            ServiceError::InvalidReference(format!(
                "location {} is not owned by company {}",
                location_id, company_id
            ))
        })?;
    Ok(())
}

async fn find_balance<C: ConnectionTrait>(
    conn: &C,
    key: &BalanceKey,
) -> Result<Option<stock_balance::Model>, ServiceError> {
    StockBalances::find()
        .filter(stock_balance::Column::CompanyId.eq(key.company_id))
        .filter(stock_balance::Column::PartId.eq(key.part_id))
        .filter(stock_balance::Column::LocationId.eq(key.location_id))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)
}

fn snapshot(balance: Option<&stock_balance::Model>) -> BalanceState {
    balance
        .map(|b| BalanceState {
            on_hand: b.on_hand,
            reserved: b.reserved,
            available: b.available,
            average_cost: b.average_cost,
        })
        .unwrap_or_else(BalanceState::empty)
}

/// Writes the computed state back. Existing rows are updated through a
/// version-checked `UPDATE`; zero affected rows means another writer got
/// there first and the caller must retry against fresh state. Missing
/// rows are created, satisfying the lazy-creation lifecycle.
async fn persist_balance<C: ConnectionTrait>(
    conn: &C,
    key: &BalanceKey,
    existing: Option<stock_balance::Model>,
    state: &BalanceState,
    count_stamp: Option<CountStamp>,
) -> Result<stock_balance::Model, ServiceError> {
    let now = Utc::now();
    match existing {
        Some(current) => {
            let next_version = current.version + 1;
            let mut values = stock_balance::ActiveModel {
                on_hand: Set(state.on_hand),
                reserved: Set(state.reserved),
                available: Set(state.available),
                average_cost: Set(state.average_cost),
                version: Set(next_version),
                updated_at: Set(now),
                ..Default::default()
            };
            if let Some(stamp) = &count_stamp {
                values.last_counted_at = Set(Some(stamp.at));
                values.last_counted_by = Set(stamp.by);
            }
            let result = StockBalances::update_many()
                .set(values)
                .filter(stock_balance::Column::Id.eq(current.id))
                .filter(stock_balance::Column::Version.eq(current.version))
                .exec(conn)
                .await
                .map_err(ServiceError::db_error)?;

            if result.rows_affected == 0 {
                return Err(ServiceError::ConcurrentModification {
                    part_id: key.part_id,
                    location_id: key.location_id,
                });
            }

            Ok(stock_balance::Model {
                on_hand: state.on_hand,
                reserved: state.reserved,
                available: state.available,
                average_cost: state.average_cost,
                version: next_version,
                last_counted_at: count_stamp
                    .as_ref()
                    .map(|s| s.at)
                    .or(current.last_counted_at),
                last_counted_by: count_stamp
                    .as_ref()
                    .and_then(|s| s.by)
                    .or(current.last_counted_by),
                updated_at: now,
                ..current
            })
        }
        None => {
            let model = stock_balance::ActiveModel {
                company_id: Set(key.company_id),
                part_id: Set(key.part_id),
                location_id: Set(key.location_id),
                on_hand: Set(state.on_hand),
                reserved: Set(state.reserved),
                available: Set(state.available),
                average_cost: Set(state.average_cost),
                version: Set(1),
                last_counted_at: Set(count_stamp.as_ref().map(|s| s.at)),
                last_counted_by: Set(count_stamp.as_ref().and_then(|s| s.by)),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            };
            model.insert(conn).await.map_err(ServiceError::db_error)
        }
    }
}

async fn insert_entry<C: ConnectionTrait>(
    conn: &C,
    key: &BalanceKey,
    entry_type: MovementType,
    effect: &MovementEffect,
    meta: &MovementMeta,
) -> Result<ledger_entry::Model, ServiceError> {
    let total_cost = effect
        .unit_cost
        .map(|c| c * Decimal::from(effect.entry_quantity.abs()));
    let entry = ledger_entry::ActiveModel {
        id: Set(Uuid::new_v4()),
        company_id: Set(key.company_id),
        part_id: Set(key.part_id),
        location_id: Set(key.location_id),
        entry_type: Set(entry_type),
        quantity: Set(effect.entry_quantity),
        unit_cost: Set(effect.unit_cost),
        total_cost: Set(total_cost),
        reason: Set(meta.reason.clone()),
        notes: Set(meta.notes.clone()),
        reference: Set(meta.reference.clone()),
        from_location_id: Set(meta.from_location_id),
        to_location_id: Set(meta.to_location_id),
        related_id: Set(meta.related_id),
        reference_type: Set(meta.reference_type.clone()),
        user_id: Set(meta.user_id),
        created_at: Set(Utc::now()),
    };
    entry.insert(conn).await.map_err(ServiceError::db_error)
}

async fn apply_movement_in_txn<C: ConnectionTrait>(
    conn: &C,
    key: &BalanceKey,
    movement: &StockMovement,
    meta: &MovementMeta,
) -> Result<MovementOutcome, ServiceError> {
    let part = load_owned_part(conn, key).await?;
    ensure_owned_location(conn, key.company_id, key.location_id).await?;

    let existing = find_balance(conn, key).await?;
    let state = snapshot(existing.as_ref());
    let effect = movement::apply_movement(key, &state, movement, part.unit_cost)?;

    let balance = persist_balance(conn, key, existing, &effect.state, None).await?;
    let entry = insert_entry(conn, key, movement.movement_type(), &effect, meta).await?;

    Ok(MovementOutcome { balance, entry })
}

#[allow(clippy::too_many_arguments)]
async fn apply_transfer_in_txn<C: ConnectionTrait>(
    conn: &C,
    company_id: Uuid,
    part_id: Uuid,
    from_location_id: Uuid,
    to_location_id: Uuid,
    quantity: i64,
    unit_cost: Option<Decimal>,
    meta: &MovementMeta,
    transfer_id: Uuid,
) -> Result<(MovementOutcome, MovementOutcome), ServiceError> {
    let out_key = BalanceKey::new(company_id, part_id, from_location_id);
    let in_key = BalanceKey::new(company_id, part_id, to_location_id);

    // Price the inbound leg at the source's average cost as of this call
    // unless the caller overrides it.
    let source_average = find_balance(conn, &out_key)
        .await?
        .map(|b| b.average_cost)
        .unwrap_or(Decimal::ZERO);
    let inbound_cost = unit_cost.or(Some(source_average));

    let linked = MovementMeta {
        from_location_id: Some(from_location_id),
        to_location_id: Some(to_location_id),
        related_id: Some(transfer_id),
        reference_type: Some(TRANSFER_REFERENCE.to_string()),
        ..meta.clone()
    };

    let out = apply_movement_in_txn(
        conn,
        &out_key,
        &StockMovement::TransferOut { quantity },
        &linked,
    )
    .await?;
    let inbound = apply_movement_in_txn(
        conn,
        &in_key,
        &StockMovement::TransferIn {
            quantity,
            unit_cost: inbound_cost,
        },
        &linked,
    )
    .await?;

    Ok((out, inbound))
}

async fn apply_count_in_txn<C: ConnectionTrait>(
    conn: &C,
    key: &BalanceKey,
    counted_quantity: i64,
    counted_by: Option<Uuid>,
    meta: &MovementMeta,
) -> Result<(stock_balance::Model, i64, Option<ledger_entry::Model>), ServiceError> {
    let part = load_owned_part(conn, key).await?;
    ensure_owned_location(conn, key.company_id, key.location_id).await?;

    let existing = find_balance(conn, key).await?;
    let state = snapshot(existing.as_ref());
    let delta = counted_quantity - state.on_hand;
    let stamp = CountStamp {
        at: Utc::now(),
        by: counted_by,
    };

    if delta == 0 {
        let balance = persist_balance(conn, key, existing, &state, Some(stamp)).await?;
        return Ok((balance, 0, None));
    }

    let counted_meta = MovementMeta {
        reason: Some(PHYSICAL_COUNT_REASON.to_string()),
        user_id: meta.user_id.or(counted_by),
        ..meta.clone()
    };
    let effect = movement::apply_movement(
        key,
        &state,
        &StockMovement::Adjustment { delta },
        part.unit_cost,
    )?;
    let balance = persist_balance(conn, key, existing, &effect.state, Some(stamp)).await?;
    let entry = insert_entry(conn, key, MovementType::Adjustment, &effect, &counted_meta).await?;

    Ok((balance, delta, Some(entry)))
}

async fn apply_reservation_in_txn<C: ConnectionTrait>(
    conn: &C,
    key: &BalanceKey,
    quantity: i64,
    release: bool,
) -> Result<stock_balance::Model, ServiceError> {
    load_owned_part(conn, key).await?;
    ensure_owned_location(conn, key.company_id, key.location_id).await?;

    let existing = find_balance(conn, key).await?;
    let state = snapshot(existing.as_ref());
    let next = if release {
        movement::apply_release(key, &state, quantity)?
    } else {
        movement::apply_reservation(key, &state, quantity)?
    };

    persist_balance(conn, key, existing, &next, None).await
}
