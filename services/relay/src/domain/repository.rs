#![allow(async_fn_in_trait)]

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::domain::types::{MessageEnvelope, OutboxRecord};
use crate::error::RelayError;

/// Durable queue of pending deliveries.
///
/// Concurrent dispatcher instances coordinate purely through this store:
/// claiming must hand out disjoint record sets (skip-locked read + lease).
pub trait OutboxStore: Send + Sync {
    /// Idempotent schema bootstrap; safe to call on every cycle.
    async fn ensure_schema(&self) -> Result<(), RelayError>;

    /// Claim up to `batch_size` pending records in one short transaction:
    /// `dispatched_at` null, no live lease, attempts under `max_attempts`
    /// (ignored when `max_attempts <= 0`), ordered `created_at` ascending.
    /// Winners are stamped with a lease good for `lease_ttl`.
    async fn claim_pending(
        &self,
        batch_size: u64,
        max_attempts: i32,
        lease_ttl: Duration,
    ) -> Result<Vec<OutboxRecord>, RelayError>;

    /// Terminal success: sets `dispatched_at`, increments `attempts`,
    /// clears `last_error` and the lease.
    async fn mark_dispatched(&self, id: Uuid) -> Result<(), RelayError>;

    /// Failed outcome: increments `attempts`, records the reason, clears
    /// the lease so the next cycle may retry immediately.
    async fn record_failure(&self, id: Uuid, reason: &str) -> Result<(), RelayError>;
}

/// Producer half of the broker contract. Failures carry their own
/// transient/permanent classification (`RelayError: Retryable`).
pub trait MessagePublisher: Send + Sync {
    async fn publish(&self, envelope: &MessageEnvelope) -> Result<(), RelayError>;
}

/// Consumer half of the broker contract. Each incoming message runs through
/// `handler`; success acknowledges (removes) it, failure negatively
/// acknowledges WITHOUT requeue — redelivery is the producer side's job.
pub trait MessageConsumer: Send + Sync {
    fn start<H, Fut>(&self, handler: H) -> Result<JoinHandle<()>, RelayError>
    where
        H: Fn(MessageEnvelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), RelayError>> + Send;
}

/// Transport-level webhook POST. Returns the response status; transport
/// failures (DNS, refused connection, timeout) are `Err`.
pub trait WebhookTransport: Send + Sync {
    async fn post(
        &self,
        endpoint: &str,
        body: &str,
        headers: &[(String, String)],
        timeout: Duration,
    ) -> Result<u16, RelayError>;
}

/// Signing collaborator for webhook payloads, keyed by tenant.
pub trait PayloadSigner: Send + Sync {
    fn sign(
        &self,
        tenant_id: Option<Uuid>,
        secret: &str,
        payload: &str,
    ) -> Result<String, RelayError>;
}
