use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(OutboxMessages::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OutboxMessages::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OutboxMessages::TenantId).uuid())
                    .col(ColumnDef::new(OutboxMessages::Topic).string().not_null())
                    .col(
                        ColumnDef::new(OutboxMessages::Headers)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OutboxMessages::Payload)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OutboxMessages::MessageType)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OutboxMessages::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(OutboxMessages::DispatchedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(OutboxMessages::Attempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(OutboxMessages::LastError).string())
                    .col(ColumnDef::new(OutboxMessages::ClaimedBy).string())
                    .col(ColumnDef::new(OutboxMessages::LeaseExpiresAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        // Index for the claim query (pending rows, created_at ascending).
        manager
            .create_index(
                Index::create()
                    .table(OutboxMessages::Table)
                    .col(OutboxMessages::CreatedAt)
                    .name("idx_outbox_messages_created_at")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(OutboxMessages::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum OutboxMessages {
    Table,
    Id,
    TenantId,
    Topic,
    Headers,
    Payload,
    MessageType,
    CreatedAt,
    DispatchedAt,
    Attempts,
    LastError,
    ClaimedBy,
    LeaseExpiresAt,
}
