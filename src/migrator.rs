use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_master_data_tables::Migration),
            Box::new(m20240101_000002_create_stock_balances_table::Migration),
            Box::new(m20240101_000003_create_ledger_entries_table::Migration),
        ]
    }
}

// Migration implementations

mod m20240101_000001_create_master_data_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_master_data_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Parts and locations are owned by external master-data
            // services; the ledger only reads them.
            manager
                .create_table(
                    Table::create()
                        .table(Parts::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Parts::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Parts::CompanyId).uuid().not_null())
                        .col(ColumnDef::new(Parts::PartNumber).string().not_null())
                        .col(ColumnDef::new(Parts::Description).string().null())
                        .col(ColumnDef::new(Parts::UnitCost).decimal().null())
                        .col(
                            ColumnDef::new(Parts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Parts::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_parts_company_id")
                        .table(Parts::Table)
                        .col(Parts::CompanyId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(StockLocations::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockLocations::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockLocations::CompanyId).uuid().not_null())
                        .col(ColumnDef::new(StockLocations::Name).string().not_null())
                        .col(
                            ColumnDef::new(StockLocations::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockLocations::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_locations_company_id")
                        .table(StockLocations::Table)
                        .col(StockLocations::CompanyId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockLocations::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Parts::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Parts {
        Table,
        Id,
        CompanyId,
        PartNumber,
        Description,
        UnitCost,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum StockLocations {
        Table,
        Id,
        CompanyId,
        Name,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_stock_balances_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_stock_balances_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockBalances::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockBalances::Id)
                                .big_integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockBalances::CompanyId).uuid().not_null())
                        .col(ColumnDef::new(StockBalances::PartId).uuid().not_null())
                        .col(ColumnDef::new(StockBalances::LocationId).uuid().not_null())
                        .col(
                            ColumnDef::new(StockBalances::OnHand)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockBalances::Reserved)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockBalances::Available)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockBalances::AverageCost)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockBalances::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(StockBalances::LastCountedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(StockBalances::LastCountedBy).uuid().null())
                        .col(
                            ColumnDef::new(StockBalances::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockBalances::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // One balance row per (company, part, location) triple
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_stock_balances_company_part_location")
                        .table(StockBalances::Table)
                        .col(StockBalances::CompanyId)
                        .col(StockBalances::PartId)
                        .col(StockBalances::LocationId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockBalances::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum StockBalances {
        Table,
        Id,
        CompanyId,
        PartId,
        LocationId,
        OnHand,
        Reserved,
        Available,
        AverageCost,
        Version,
        LastCountedAt,
        LastCountedBy,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000003_create_ledger_entries_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_ledger_entries_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(LedgerEntries::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(LedgerEntries::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(LedgerEntries::CompanyId).uuid().not_null())
                        .col(ColumnDef::new(LedgerEntries::PartId).uuid().not_null())
                        .col(ColumnDef::new(LedgerEntries::LocationId).uuid().not_null())
                        .col(
                            ColumnDef::new(LedgerEntries::EntryType)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(LedgerEntries::Quantity)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(LedgerEntries::UnitCost).decimal().null())
                        .col(ColumnDef::new(LedgerEntries::TotalCost).decimal().null())
                        .col(ColumnDef::new(LedgerEntries::Reason).string().null())
                        .col(ColumnDef::new(LedgerEntries::Notes).string().null())
                        .col(ColumnDef::new(LedgerEntries::Reference).string().null())
                        .col(
                            ColumnDef::new(LedgerEntries::FromLocationId)
                                .uuid()
                                .null(),
                        )
                        .col(ColumnDef::new(LedgerEntries::ToLocationId).uuid().null())
                        .col(ColumnDef::new(LedgerEntries::RelatedId).uuid().null())
                        .col(ColumnDef::new(LedgerEntries::ReferenceType).string().null())
                        .col(ColumnDef::new(LedgerEntries::UserId).uuid().null())
                        .col(
                            ColumnDef::new(LedgerEntries::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // History lookups scan one triple in time order
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_ledger_entries_triple_created_at")
                        .table(LedgerEntries::Table)
                        .col(LedgerEntries::CompanyId)
                        .col(LedgerEntries::PartId)
                        .col(LedgerEntries::LocationId)
                        .col(LedgerEntries::CreatedAt)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_ledger_entries_related_id")
                        .table(LedgerEntries::Table)
                        .col(LedgerEntries::RelatedId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(LedgerEntries::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum LedgerEntries {
        Table,
        Id,
        CompanyId,
        PartId,
        LocationId,
        EntryType,
        Quantity,
        UnitCost,
        TotalCost,
        Reason,
        Notes,
        Reference,
        FromLocationId,
        ToLocationId,
        RelatedId,
        ReferenceType,
        UserId,
        CreatedAt,
    }
}
