use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use crate::entities::ledger_entry::MovementType;

/// Domain events emitted by the stock ledger after a committed mutation.
///
/// Events are a notification surface for collaborators (reorder checks,
/// reporting caches); the ledger itself never depends on their delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    StockAdjusted {
        company_id: Uuid,
        part_id: Uuid,
        location_id: Uuid,
        entry_type: MovementType,
        quantity: i64,
        on_hand: i64,
        available: i64,
        entry_id: Uuid,
    },
    StockTransferred {
        company_id: Uuid,
        part_id: Uuid,
        from_location_id: Uuid,
        to_location_id: Uuid,
        quantity: i64,
        transfer_id: Uuid,
    },
    StockReserved {
        company_id: Uuid,
        part_id: Uuid,
        location_id: Uuid,
        quantity: i64,
        available: i64,
    },
    StockReleased {
        company_id: Uuid,
        part_id: Uuid,
        location_id: Uuid,
        quantity: i64,
        available: i64,
    },
    StockCounted {
        company_id: Uuid,
        part_id: Uuid,
        location_id: Uuid,
        counted_quantity: i64,
        delta: i64,
        counted_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Drains the event channel, logging each event. Audit persistence and
/// downstream reactions belong to external consumers; this loop is the
/// default sink so senders never block on a full channel.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::StockAdjusted {
                part_id,
                location_id,
                entry_type,
                quantity,
                ..
            } => {
                info!(
                    part_id = %part_id,
                    location_id = %location_id,
                    entry_type = entry_type.as_str(),
                    quantity = quantity,
                    "Stock adjusted"
                );
            }
            Event::StockTransferred {
                part_id,
                from_location_id,
                to_location_id,
                quantity,
                ..
            } => {
                info!(
                    part_id = %part_id,
                    from_location_id = %from_location_id,
                    to_location_id = %to_location_id,
                    quantity = quantity,
                    "Stock transferred"
                );
            }
            Event::StockReserved {
                part_id,
                location_id,
                quantity,
                ..
            }
            | Event::StockReleased {
                part_id,
                location_id,
                quantity,
                ..
            } => {
                info!(
                    part_id = %part_id,
                    location_id = %location_id,
                    quantity = quantity,
                    "Reservation changed"
                );
            }
            Event::StockCounted {
                part_id,
                location_id,
                counted_quantity,
                delta,
                ..
            } => {
                info!(
                    part_id = %part_id,
                    location_id = %location_id,
                    counted_quantity = counted_quantity,
                    delta = delta,
                    "Stock counted"
                );
            }
        }
    }

    info!("Event processing loop stopped");
}
