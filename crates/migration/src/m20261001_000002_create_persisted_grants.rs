//! Persisted grant store.
//!
//! Rows are written by the identity-provider runtime on token issuance; the
//! administration layer only reads and deletes them. The table may live in a
//! different database than the identity tables, so there is no foreign key
//! from `subject_id` to `users`.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PersistedGrants::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PersistedGrants::Key)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PersistedGrants::GrantType).string().not_null())
                    .col(ColumnDef::new(PersistedGrants::SubjectId).string().null())
                    .col(ColumnDef::new(PersistedGrants::SessionId).string().null())
                    .col(ColumnDef::new(PersistedGrants::ClientId).string().not_null())
                    .col(ColumnDef::new(PersistedGrants::Description).string().null())
                    .col(
                        ColumnDef::new(PersistedGrants::CreationTime)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PersistedGrants::Expiration)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PersistedGrants::ConsumedTime)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(PersistedGrants::Data).text().not_null())
                    .to_owned(),
            )
            .await?;

        // Bulk revocation filters on subject, then client, then type
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_persisted_grants_subject_client_type")
                    .table(PersistedGrants::Table)
                    .col(PersistedGrants::SubjectId)
                    .col(PersistedGrants::ClientId)
                    .col(PersistedGrants::GrantType)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_persisted_grants_subject_session_type")
                    .table(PersistedGrants::Table)
                    .col(PersistedGrants::SubjectId)
                    .col(PersistedGrants::SessionId)
                    .col(PersistedGrants::GrantType)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_persisted_grants_expiration")
                    .table(PersistedGrants::Table)
                    .col(PersistedGrants::Expiration)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PersistedGrants::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum PersistedGrants {
    Table,
    Key,
    GrantType,
    SubjectId,
    SessionId,
    ClientId,
    Description,
    CreationTime,
    Expiration,
    ConsumedTime,
    Data,
}
