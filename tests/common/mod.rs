use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use tokio::sync::mpsc;
use uuid::Uuid;

use stock_ledger::db::{self, DbConfig, DbPool};
use stock_ledger::entities::{part, stock_location};
use stock_ledger::events::{self, EventSender};
use stock_ledger::StockLedgerService;

/// Test harness holding a ledger service backed by a private in-memory
/// SQLite database.
pub struct TestLedger {
    pub db: Arc<DbPool>,
    pub service: StockLedgerService,
}

pub async fn setup() -> TestLedger {
    // A single connection keeps each test on its own in-memory database
    // and serializes transactions deterministically.
    let cfg = DbConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        min_connections: 1,
        ..Default::default()
    };
    let pool = db::establish_connection_with_config(&cfg)
        .await
        .expect("Failed to create DB pool");
    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    let db = Arc::new(pool);
    let (tx, rx) = mpsc::channel(256);
    tokio::spawn(events::process_events(rx));
    let service = StockLedgerService::new(db.clone(), Arc::new(EventSender::new(tx)));

    TestLedger { db, service }
}

pub async fn seed_part(
    db: &DbPool,
    company_id: Uuid,
    part_number: &str,
    unit_cost: Option<Decimal>,
) -> part::Model {
    let now = Utc::now();
    part::ActiveModel {
        id: Set(Uuid::new_v4()),
        company_id: Set(company_id),
        part_number: Set(part_number.to_string()),
        description: Set(Some(format!("{} test part", part_number))),
        unit_cost: Set(unit_cost),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("Failed to create part")
}

pub async fn seed_location(db: &DbPool, company_id: Uuid, name: &str) -> stock_location::Model {
    let now = Utc::now();
    stock_location::ActiveModel {
        id: Set(Uuid::new_v4()),
        company_id: Set(company_id),
        name: Set(name.to_string()),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("Failed to create location")
}
