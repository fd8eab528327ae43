use async_trait::async_trait;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::{
    ledger_entry::{self, Entity as LedgerEntries},
    stock_balance::{self, Entity as StockBalances},
};
use crate::errors::ServiceError;
use crate::queries::Query;
use crate::services::movement::BalanceKey;

/// Fetches the current balance for one triple, if a movement has ever
/// touched it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetStockBalanceQuery {
    pub key: BalanceKey,
}

#[async_trait]
impl Query for GetStockBalanceQuery {
    type Result = Option<stock_balance::Model>;

    async fn execute(&self, db: &DatabaseConnection) -> Result<Self::Result, ServiceError> {
        StockBalances::find()
            .filter(stock_balance::Column::CompanyId.eq(self.key.company_id))
            .filter(stock_balance::Column::PartId.eq(self.key.part_id))
            .filter(stock_balance::Column::LocationId.eq(self.key.location_id))
            .one(db)
            .await
            .map_err(ServiceError::db_error)
    }
}

/// Lists a part's balances across all of a company's locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListPartBalancesQuery {
    pub company_id: Uuid,
    pub part_id: Uuid,
}

#[async_trait]
impl Query for ListPartBalancesQuery {
    type Result = Vec<stock_balance::Model>;

    async fn execute(&self, db: &DatabaseConnection) -> Result<Self::Result, ServiceError> {
        StockBalances::find()
            .filter(stock_balance::Column::CompanyId.eq(self.company_id))
            .filter(stock_balance::Column::PartId.eq(self.part_id))
            .order_by_asc(stock_balance::Column::LocationId)
            .all(db)
            .await
            .map_err(ServiceError::db_error)
    }
}

/// Pages through one triple's movement history, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListLedgerEntriesQuery {
    pub key: BalanceKey,
    pub page: u64,
    pub limit: u64,
}

#[async_trait]
impl Query for ListLedgerEntriesQuery {
    type Result = (Vec<ledger_entry::Model>, u64);

    async fn execute(&self, db: &DatabaseConnection) -> Result<Self::Result, ServiceError> {
        if self.page == 0 {
            return Err(ServiceError::ValidationError(
                "Page number must be greater than 0".to_string(),
            ));
        }
        if self.limit == 0 || self.limit > 1000 {
            return Err(ServiceError::ValidationError(
                "Limit must be between 1 and 1000".to_string(),
            ));
        }

        let paginator = LedgerEntries::find()
            .filter(ledger_entry::Column::CompanyId.eq(self.key.company_id))
            .filter(ledger_entry::Column::PartId.eq(self.key.part_id))
            .filter(ledger_entry::Column::LocationId.eq(self.key.location_id))
            .order_by_desc(ledger_entry::Column::CreatedAt)
            .paginate(db, self.limit);

        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let entries = paginator
            .fetch_page(self.page - 1)
            .await
            .map_err(ServiceError::db_error)?;

        Ok((entries, total))
    }
}

/// Lists the two linked entries of one transfer (or any related group).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListRelatedEntriesQuery {
    pub company_id: Uuid,
    pub related_id: Uuid,
}

#[async_trait]
impl Query for ListRelatedEntriesQuery {
    type Result = Vec<ledger_entry::Model>;

    async fn execute(&self, db: &DatabaseConnection) -> Result<Self::Result, ServiceError> {
        LedgerEntries::find()
            .filter(ledger_entry::Column::CompanyId.eq(self.company_id))
            .filter(ledger_entry::Column::RelatedId.eq(self.related_id))
            .order_by_asc(ledger_entry::Column::CreatedAt)
            .all(db)
            .await
            .map_err(ServiceError::db_error)
    }
}
