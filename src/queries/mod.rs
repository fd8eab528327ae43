use async_trait::async_trait;
use sea_orm::DatabaseConnection;

use crate::errors::ServiceError;

pub mod stock_queries;

/// Read-only query over the ledger's persisted state.
///
/// Queries are the surface the reporting collaborator consumes; none of
/// them mutate anything.
#[async_trait]
pub trait Query: Send + Sync {
    type Result: Send + Sync;

    async fn execute(&self, db: &DatabaseConnection) -> Result<Self::Result, ServiceError>;
}
