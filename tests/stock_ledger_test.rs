mod common;

use assert_matches::assert_matches;
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;
use uuid::Uuid;

use stock_ledger::entities::{ledger_entry, stock_balance};
use stock_ledger::queries::stock_queries::{GetStockBalanceQuery, ListLedgerEntriesQuery};
use stock_ledger::queries::Query;
use stock_ledger::{BalanceKey, MovementMeta, MovementType, ServiceError, StockMovement};

use common::{seed_location, seed_part, setup};

fn assert_invariants(balance: &stock_balance::Model) {
    assert!(balance.on_hand >= 0, "on_hand must stay non-negative");
    assert!(balance.reserved >= 0, "reserved must stay non-negative");
    assert!(balance.available >= 0, "available must stay non-negative");
    assert_eq!(
        balance.available,
        balance.on_hand - balance.reserved,
        "available must track on_hand - reserved"
    );
}

async fn balance_for(ledger: &common::TestLedger, key: BalanceKey) -> stock_balance::Model {
    GetStockBalanceQuery { key }
        .execute(&ledger.db)
        .await
        .expect("Failed to query balance")
        .expect("Balance not found")
}

async fn entry_count(ledger: &common::TestLedger) -> usize {
    ledger_entry::Entity::find()
        .all(ledger.db.as_ref())
        .await
        .expect("Failed to query entries")
        .len()
}

#[tokio::test]
async fn receipt_creates_balance_and_entry() {
    let ledger = setup().await;
    let company = Uuid::new_v4();
    let part = seed_part(&ledger.db, company, "BRG-6204", None).await;
    let location = seed_location(&ledger.db, company, "Main Warehouse").await;
    let key = BalanceKey::new(company, part.id, location.id);

    let entry = ledger
        .service
        .adjust_stock(
            key,
            StockMovement::Receipt {
                quantity: 100,
                unit_cost: Some(dec!(12.5)),
            },
            MovementMeta {
                reference: Some("PO-1001".to_string()),
                reference_type: Some("PO Receipt".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to receive stock");

    assert_eq!(entry.entry_type, MovementType::Receipt);
    assert_eq!(entry.quantity, 100);
    assert_eq!(entry.unit_cost, Some(dec!(12.5)));
    assert_eq!(entry.total_cost, Some(dec!(1250)));
    assert_eq!(entry.reference_type.as_deref(), Some("PO Receipt"));

    let balance = balance_for(&ledger, key).await;
    assert_eq!(balance.on_hand, 100);
    assert_eq!(balance.reserved, 0);
    assert_eq!(balance.available, 100);
    assert_eq!(balance.average_cost, dec!(12.5));
    assert_invariants(&balance);
}

#[tokio::test]
async fn receipts_recompute_the_weighted_average() {
    let ledger = setup().await;
    let company = Uuid::new_v4();
    let part = seed_part(&ledger.db, company, "BRG-6205", None).await;
    let location = seed_location(&ledger.db, company, "Main Warehouse").await;
    let key = BalanceKey::new(company, part.id, location.id);

    for (quantity, cost) in [(10, dec!(5)), (10, dec!(7))] {
        ledger
            .service
            .adjust_stock(
                key,
                StockMovement::Receipt {
                    quantity,
                    unit_cost: Some(cost),
                },
                MovementMeta::default(),
            )
            .await
            .expect("Failed to receive stock");
    }

    let balance = balance_for(&ledger, key).await;
    assert_eq!(balance.on_hand, 20);
    // weighted average of 10 @ 5 and 10 @ 7
    assert_eq!(balance.average_cost, dec!(6));
    assert_invariants(&balance);
}

#[tokio::test]
async fn unpriced_receipt_uses_the_catalog_cost() {
    let ledger = setup().await;
    let company = Uuid::new_v4();
    let part = seed_part(&ledger.db, company, "SEAL-112", Some(dec!(4))).await;
    let location = seed_location(&ledger.db, company, "Main Warehouse").await;
    let key = BalanceKey::new(company, part.id, location.id);

    let entry = ledger
        .service
        .adjust_stock(
            key,
            StockMovement::Receipt {
                quantity: 5,
                unit_cost: None,
            },
            MovementMeta::default(),
        )
        .await
        .expect("Failed to receive stock");

    assert_eq!(entry.unit_cost, Some(dec!(4)));
    let balance = balance_for(&ledger, key).await;
    assert_eq!(balance.average_cost, dec!(4));
}

#[tokio::test]
async fn issue_decrements_without_touching_the_average() {
    let ledger = setup().await;
    let company = Uuid::new_v4();
    let part = seed_part(&ledger.db, company, "FIL-220", None).await;
    let location = seed_location(&ledger.db, company, "Main Warehouse").await;
    let key = BalanceKey::new(company, part.id, location.id);

    ledger
        .service
        .adjust_stock(
            key,
            StockMovement::Receipt {
                quantity: 10,
                unit_cost: Some(dec!(5)),
            },
            MovementMeta::default(),
        )
        .await
        .expect("Failed to receive stock");

    let entry = ledger
        .service
        .adjust_stock(
            key,
            StockMovement::Issue { quantity: 4 },
            MovementMeta {
                reference_type: Some("Work Order".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to issue stock");

    assert_eq!(entry.entry_type, MovementType::Issue);
    assert_eq!(entry.quantity, 4);
    assert_eq!(entry.unit_cost, Some(dec!(5)));

    let balance = balance_for(&ledger, key).await;
    assert_eq!(balance.on_hand, 6);
    assert_eq!(balance.average_cost, dec!(5));
    assert_invariants(&balance);
}

#[tokio::test]
async fn issue_beyond_available_fails_with_zero_side_effects() {
    let ledger = setup().await;
    let company = Uuid::new_v4();
    let part = seed_part(&ledger.db, company, "GSK-330", None).await;
    let location = seed_location(&ledger.db, company, "Main Warehouse").await;
    let key = BalanceKey::new(company, part.id, location.id);

    ledger
        .service
        .adjust_stock(
            key,
            StockMovement::Receipt {
                quantity: 5,
                unit_cost: Some(dec!(2)),
            },
            MovementMeta::default(),
        )
        .await
        .expect("Failed to receive stock");
    ledger
        .service
        .reserve_stock(key, 2)
        .await
        .expect("Failed to reserve stock");

    let entries_before = entry_count(&ledger).await;
    let err = ledger
        .service
        .adjust_stock(key, StockMovement::Issue { quantity: 4 }, MovementMeta::default())
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::InsufficientStock {
            requested: 4,
            available: 3,
            ..
        }
    );

    // Nothing was committed: balance and ledger are untouched.
    let balance = balance_for(&ledger, key).await;
    assert_eq!(balance.on_hand, 5);
    assert_eq!(balance.reserved, 2);
    assert_eq!(balance.available, 3);
    assert_eq!(entry_count(&ledger).await, entries_before);
    assert_invariants(&balance);
}

#[tokio::test]
async fn adjustment_applies_signed_deltas() {
    let ledger = setup().await;
    let company = Uuid::new_v4();
    let part = seed_part(&ledger.db, company, "HOSE-75", None).await;
    let location = seed_location(&ledger.db, company, "Main Warehouse").await;
    let key = BalanceKey::new(company, part.id, location.id);

    ledger
        .service
        .adjust_stock(
            key,
            StockMovement::Receipt {
                quantity: 10,
                unit_cost: Some(dec!(5)),
            },
            MovementMeta::default(),
        )
        .await
        .expect("Failed to receive stock");

    let entry = ledger
        .service
        .adjust_stock(
            key,
            StockMovement::Adjustment { delta: -3 },
            MovementMeta {
                reason: Some("Damaged in handling".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to adjust stock");

    assert_eq!(entry.entry_type, MovementType::Adjustment);
    assert_eq!(entry.quantity, -3);

    let balance = balance_for(&ledger, key).await;
    assert_eq!(balance.on_hand, 7);
    assert_eq!(balance.average_cost, dec!(5));
    assert_invariants(&balance);
}

#[tokio::test]
async fn adjustment_below_zero_is_rejected() {
    let ledger = setup().await;
    let company = Uuid::new_v4();
    let part = seed_part(&ledger.db, company, "PUMP-9", None).await;
    let location = seed_location(&ledger.db, company, "Main Warehouse").await;
    let key = BalanceKey::new(company, part.id, location.id);

    ledger
        .service
        .adjust_stock(
            key,
            StockMovement::Receipt {
                quantity: 4,
                unit_cost: None,
            },
            MovementMeta::default(),
        )
        .await
        .expect("Failed to receive stock");

    let entries_before = entry_count(&ledger).await;
    let err = ledger
        .service
        .adjust_stock(
            key,
            StockMovement::Adjustment { delta: -10 },
            MovementMeta::default(),
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NegativeStock { on_hand: -6, .. });

    let balance = balance_for(&ledger, key).await;
    assert_eq!(balance.on_hand, 4);
    assert_eq!(entry_count(&ledger).await, entries_before);
}

#[tokio::test]
async fn reserve_then_release_restores_the_balance_exactly() {
    let ledger = setup().await;
    let company = Uuid::new_v4();
    let part = seed_part(&ledger.db, company, "VLV-18", None).await;
    let location = seed_location(&ledger.db, company, "Main Warehouse").await;
    let key = BalanceKey::new(company, part.id, location.id);

    ledger
        .service
        .adjust_stock(
            key,
            StockMovement::Receipt {
                quantity: 10,
                unit_cost: Some(dec!(3)),
            },
            MovementMeta::default(),
        )
        .await
        .expect("Failed to receive stock");
    let before = balance_for(&ledger, key).await;
    let entries_before = entry_count(&ledger).await;

    let reserved = ledger
        .service
        .reserve_stock(key, 4)
        .await
        .expect("Failed to reserve stock");
    assert_eq!(reserved.on_hand, 10);
    assert_eq!(reserved.reserved, 4);
    assert_eq!(reserved.available, 6);
    assert_invariants(&reserved);

    let released = ledger
        .service
        .release_reserved_stock(key, 4)
        .await
        .expect("Failed to release stock");
    assert_eq!(released.on_hand, before.on_hand);
    assert_eq!(released.reserved, before.reserved);
    assert_eq!(released.available, before.available);
    assert_eq!(released.average_cost, before.average_cost);

    // Reservations are not physical movements: no new ledger entries.
    assert_eq!(entry_count(&ledger).await, entries_before);
}

#[tokio::test]
async fn release_beyond_reservation_fails() {
    let ledger = setup().await;
    let company = Uuid::new_v4();
    let part = seed_part(&ledger.db, company, "BELT-41", None).await;
    let location = seed_location(&ledger.db, company, "Main Warehouse").await;
    let key = BalanceKey::new(company, part.id, location.id);

    ledger
        .service
        .adjust_stock(
            key,
            StockMovement::Receipt {
                quantity: 10,
                unit_cost: None,
            },
            MovementMeta::default(),
        )
        .await
        .expect("Failed to receive stock");
    ledger
        .service
        .reserve_stock(key, 2)
        .await
        .expect("Failed to reserve stock");

    let err = ledger
        .service
        .release_reserved_stock(key, 5)
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::InsufficientReservation {
            requested: 5,
            reserved: 2,
            ..
        }
    );
}

#[tokio::test]
async fn foreign_part_or_location_is_an_invalid_reference() {
    let ledger = setup().await;
    let company = Uuid::new_v4();
    let other_company = Uuid::new_v4();
    let foreign_part = seed_part(&ledger.db, other_company, "FOREIGN-1", None).await;
    let part = seed_part(&ledger.db, company, "LOCAL-1", None).await;
    let location = seed_location(&ledger.db, company, "Main Warehouse").await;
    let foreign_location = seed_location(&ledger.db, other_company, "Their Warehouse").await;

    let err = ledger
        .service
        .adjust_stock(
            BalanceKey::new(company, foreign_part.id, location.id),
            StockMovement::Receipt {
                quantity: 1,
                unit_cost: None,
            },
            MovementMeta::default(),
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidReference(_));

    let err = ledger
        .service
        .adjust_stock(
            BalanceKey::new(company, part.id, foreign_location.id),
            StockMovement::Receipt {
                quantity: 1,
                unit_cost: None,
            },
            MovementMeta::default(),
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidReference(_));

    assert_eq!(entry_count(&ledger).await, 0);
}

#[tokio::test]
async fn ledger_history_is_queryable_with_pagination() {
    let ledger = setup().await;
    let company = Uuid::new_v4();
    let part = seed_part(&ledger.db, company, "CHAIN-8", None).await;
    let location = seed_location(&ledger.db, company, "Main Warehouse").await;
    let key = BalanceKey::new(company, part.id, location.id);

    ledger
        .service
        .adjust_stock(
            key,
            StockMovement::Receipt {
                quantity: 10,
                unit_cost: Some(dec!(2)),
            },
            MovementMeta::default(),
        )
        .await
        .expect("Failed to receive stock");
    ledger
        .service
        .adjust_stock(key, StockMovement::Issue { quantity: 3 }, MovementMeta::default())
        .await
        .expect("Failed to issue stock");
    ledger
        .service
        .adjust_stock(
            key,
            StockMovement::Return {
                quantity: 1,
                unit_cost: None,
            },
            MovementMeta::default(),
        )
        .await
        .expect("Failed to return stock");

    let (entries, total) = ListLedgerEntriesQuery {
        key,
        page: 1,
        limit: 10,
    }
    .execute(&ledger.db)
    .await
    .expect("Failed to list entries");

    assert_eq!(total, 3);
    assert_eq!(entries.len(), 3);

    let err = ListLedgerEntriesQuery {
        key,
        page: 0,
        limit: 10,
    }
    .execute(&ledger.db)
    .await
    .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}
