use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use courier_retry::{AttemptFailure, RetryError, RetryPolicy};

use crate::domain::codec::CodecRegistry;
use crate::domain::repository::{MessagePublisher, OutboxStore};
use crate::domain::types::{DispatchOptions, DispatchReport, MessageEnvelope, OutboxRecord};
use crate::error::RelayError;

/// Drains pending outbox records in bounded batches.
///
/// Claiming is one short transaction (skip-locked read + lease stamp);
/// publishing runs with no transaction open. Per-record failures land in
/// that record's `attempts`/`last_error` and never abort the batch; only
/// whole-cycle infrastructure failures propagate. At-least-once: a crash
/// between publish and `mark_dispatched` re-delivers the record once its
/// lease lapses.
pub struct DispatchPendingUseCase<S, P>
where
    S: OutboxStore,
    P: MessagePublisher,
{
    pub store: S,
    pub publisher: P,
    pub codecs: CodecRegistry,
    pub options: DispatchOptions,
}

impl<S, P> DispatchPendingUseCase<S, P>
where
    S: OutboxStore,
    P: MessagePublisher,
{
    pub async fn execute(&self, cancel: &CancellationToken) -> Result<DispatchReport, RelayError> {
        self.store.ensure_schema().await?;

        let records = self
            .store
            .claim_pending(
                self.options.batch_size,
                self.options.max_attempts,
                self.options.lease_ttl,
            )
            .await?;

        let mut report = DispatchReport {
            claimed: records.len(),
            ..Default::default()
        };

        for record in records {
            if cancel.is_cancelled() {
                // Unprocessed claims are released when their lease lapses.
                break;
            }
            match self.publish_record(&record, cancel).await {
                Ok(()) => {
                    self.store.mark_dispatched(record.id).await?;
                    report.published += 1;
                }
                Err(e) => {
                    warn!(
                        record_id = %record.id,
                        message_type = %record.message_type,
                        error = %e,
                        kind = e.kind(),
                        "outbox record failed"
                    );
                    self.store.record_failure(record.id, &e.to_string()).await?;
                    report.failed += 1;
                    let attempts_now = record.attempts + 1;
                    if self.options.max_attempts > 0 && attempts_now >= self.options.max_attempts {
                        error!(
                            record_id = %record.id,
                            attempts = attempts_now,
                            "outbox record poisoned, excluded from future claims"
                        );
                    }
                }
            }
        }

        if report.claimed > 0 {
            info!(
                claimed = report.claimed,
                published = report.published,
                failed = report.failed,
                "outbox dispatch cycle complete"
            );
        }
        Ok(report)
    }

    /// Resolve, decode, and publish one record. Resolution and decode
    /// failures are permanent; the broker publish retries transient faults
    /// within this cycle's budget.
    async fn publish_record(
        &self,
        record: &OutboxRecord,
        cancel: &CancellationToken,
    ) -> Result<(), RelayError> {
        let codec = self
            .codecs
            .resolve(&record.message_type)
            .ok_or_else(|| RelayError::UnknownMessageType(record.message_type.clone()))?;
        let message = codec.decode(&record.payload)?;
        let envelope = MessageEnvelope {
            message,
            topic: record.topic.clone(),
            tenant_id: record.tenant_id,
            headers: record.headers.clone(),
        };

        let record_id = record.id;
        let policy = RetryPolicy::<RelayError>::for_retryable(self.options.publish_retry.clone())
            .on_retry(move |attempt, failure| match failure {
                AttemptFailure::Error(e) => warn!(
                    record_id = %record_id,
                    attempt,
                    error = %e,
                    "publish attempt failed, retrying"
                ),
                AttemptFailure::TimedOut(limit) => warn!(
                    record_id = %record_id,
                    attempt,
                    limit_ms = limit.as_millis() as u64,
                    "publish attempt timed out, retrying"
                ),
            });

        policy
            .run(cancel, |_| self.publisher.publish(&envelope))
            .await
            .map_err(|e| match e {
                RetryError::Inner(e) => e,
                RetryError::Timeout { attempts, limit } => RelayError::BrokerUnavailable(format!(
                    "publish timed out after {attempts} attempts ({limit:?} each)"
                )),
                RetryError::Cancelled { attempts } => RelayError::BrokerUnavailable(format!(
                    "publish cancelled after {attempts} attempts"
                )),
                RetryError::Exhausted { attempts } => RelayError::BrokerUnavailable(format!(
                    "retry attempts exhausted after {attempts} attempts"
                )),
            })
    }
}
