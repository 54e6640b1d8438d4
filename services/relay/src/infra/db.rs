use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Context as _;
use chrono::Utc;
use sea_orm::sea_query::{Expr, Index, LockBehavior, LockType};
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Schema, TransactionTrait,
};
use uuid::Uuid;

use courier_relay_schema::outbox_messages;

use crate::domain::repository::OutboxStore;
use crate::domain::types::OutboxRecord;
use crate::error::RelayError;

/// Sea-ORM outbox store.
///
/// Dispatcher instances coordinate purely through the skip-locked claim
/// query and the lease columns — no in-process state, no leader election.
#[derive(Clone)]
pub struct DbOutboxStore {
    pub db: DatabaseConnection,
    /// Stable per-process tag written into `claimed_by`.
    pub instance_id: String,
}

impl DbOutboxStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            instance_id: Uuid::new_v4().to_string(),
        }
    }
}

impl OutboxStore for DbOutboxStore {
    async fn ensure_schema(&self) -> Result<(), RelayError> {
        let backend = self.db.get_database_backend();
        let schema = Schema::new(backend);
        let mut table = schema.create_table_from_entity(outbox_messages::Entity);
        table.if_not_exists();
        self.db
            .execute(backend.build(&table))
            .await
            .context("bootstrap outbox table")?;

        let index = Index::create()
            .if_not_exists()
            .name("idx_outbox_messages_created_at")
            .table(outbox_messages::Entity)
            .col(outbox_messages::Column::CreatedAt)
            .to_owned();
        self.db
            .execute(backend.build(&index))
            .await
            .context("bootstrap outbox claim index")?;
        Ok(())
    }

    async fn claim_pending(
        &self,
        batch_size: u64,
        max_attempts: i32,
        lease_ttl: Duration,
    ) -> Result<Vec<OutboxRecord>, RelayError> {
        let now = Utc::now();
        let lease_until =
            now + chrono::Duration::from_std(lease_ttl).context("lease ttl out of range")?;

        // One short transaction: select winners with FOR UPDATE SKIP LOCKED
        // so concurrent claimants get disjoint rows, stamp their leases,
        // commit. Publishing happens after, with no transaction open.
        let txn = self.db.begin().await.context("begin claim transaction")?;

        let mut query = outbox_messages::Entity::find()
            .filter(outbox_messages::Column::DispatchedAt.is_null())
            .filter(
                Condition::any()
                    .add(outbox_messages::Column::LeaseExpiresAt.is_null())
                    .add(outbox_messages::Column::LeaseExpiresAt.lte(now)),
            );
        if max_attempts > 0 {
            query = query.filter(outbox_messages::Column::Attempts.lt(max_attempts));
        }
        let models = query
            .order_by_asc(outbox_messages::Column::CreatedAt)
            .limit(batch_size)
            .lock_with_behavior(LockType::Update, LockBehavior::SkipLocked)
            .all(&txn)
            .await
            .context("select pending outbox records")?;

        if models.is_empty() {
            txn.commit().await.context("commit empty claim")?;
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = models.iter().map(|m| m.id).collect();
        outbox_messages::Entity::update_many()
            .col_expr(
                outbox_messages::Column::ClaimedBy,
                Expr::value(self.instance_id.clone()),
            )
            .col_expr(
                outbox_messages::Column::LeaseExpiresAt,
                Expr::value(lease_until),
            )
            .filter(outbox_messages::Column::Id.is_in(ids))
            .exec(&txn)
            .await
            .context("stamp outbox leases")?;
        txn.commit().await.context("commit claim transaction")?;

        Ok(models.into_iter().map(record_from_model).collect())
    }

    async fn mark_dispatched(&self, id: Uuid) -> Result<(), RelayError> {
        let now = Utc::now();
        outbox_messages::Entity::update_many()
            .col_expr(
                outbox_messages::Column::DispatchedAt,
                Expr::value(Some(now)),
            )
            .col_expr(
                outbox_messages::Column::Attempts,
                Expr::col(outbox_messages::Column::Attempts).add(1),
            )
            .col_expr(
                outbox_messages::Column::LastError,
                Expr::value(Option::<String>::None),
            )
            .col_expr(
                outbox_messages::Column::ClaimedBy,
                Expr::value(Option::<String>::None),
            )
            .col_expr(
                outbox_messages::Column::LeaseExpiresAt,
                Expr::value(Option::<chrono::DateTime<Utc>>::None),
            )
            .filter(outbox_messages::Column::Id.eq(id))
            .exec(&self.db)
            .await
            .context("mark outbox record dispatched")?;
        Ok(())
    }

    async fn record_failure(&self, id: Uuid, reason: &str) -> Result<(), RelayError> {
        outbox_messages::Entity::update_many()
            .col_expr(
                outbox_messages::Column::Attempts,
                Expr::col(outbox_messages::Column::Attempts).add(1),
            )
            .col_expr(
                outbox_messages::Column::LastError,
                Expr::value(Some(reason.to_owned())),
            )
            .col_expr(
                outbox_messages::Column::ClaimedBy,
                Expr::value(Option::<String>::None),
            )
            .col_expr(
                outbox_messages::Column::LeaseExpiresAt,
                Expr::value(Option::<chrono::DateTime<Utc>>::None),
            )
            .filter(outbox_messages::Column::Id.eq(id))
            .exec(&self.db)
            .await
            .context("record outbox failure")?;
        Ok(())
    }
}

fn record_from_model(model: outbox_messages::Model) -> OutboxRecord {
    let headers: BTreeMap<String, String> =
        serde_json::from_value(model.headers).unwrap_or_default();
    OutboxRecord {
        id: model.id,
        tenant_id: model.tenant_id,
        topic: model.topic,
        headers,
        payload: model.payload,
        message_type: model.message_type,
        created_at: model.created_at,
        dispatched_at: model.dispatched_at,
        attempts: model.attempts,
        last_error: model.last_error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_map_model_headers_into_domain_record() {
        let model = outbox_messages::Model {
            id: Uuid::new_v4(),
            tenant_id: None,
            topic: "orders.created".into(),
            headers: serde_json::json!({ "trace-id": "abc" }),
            payload: serde_json::json!({ "order_id": 42 }),
            message_type: "json".into(),
            created_at: Utc::now(),
            dispatched_at: None,
            attempts: 0,
            last_error: None,
            claimed_by: None,
            lease_expires_at: None,
        };
        let record = record_from_model(model);
        assert_eq!(record.headers.get("trace-id").unwrap(), "abc");
        assert_eq!(record.message_type, "json");
    }

    #[test]
    fn should_tolerate_non_map_headers() {
        let model = outbox_messages::Model {
            id: Uuid::new_v4(),
            tenant_id: None,
            topic: "orders.created".into(),
            headers: serde_json::json!(["not", "a", "map"]),
            payload: serde_json::json!({}),
            message_type: "json".into(),
            created_at: Utc::now(),
            dispatched_at: None,
            attempts: 0,
            last_error: None,
            claimed_by: None,
            lease_expires_at: None,
        };
        let record = record_from_model(model);
        assert!(record.headers.is_empty());
    }
}
