use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use courier_retry::{Backoff, RetryError, RetryOptions, RetryPolicy};

use crate::domain::repository::{PayloadSigner, WebhookTransport};
use crate::domain::types::{WebhookDelivery, WebhookRequest};

/// Header carrying the hex HMAC-SHA256 signature of the payload.
pub const SIGNATURE_HEADER: &str = "x-courier-signature";
/// Header carrying the event type token.
pub const EVENT_HEADER: &str = "x-courier-event";

/// Webhook delivery retry curve: 200ms * 2^(attempt-1), no jitter.
const BACKOFF_BASE: Duration = Duration::from_millis(200);
const BACKOFF_MAX: Duration = Duration::from_secs(30);

/// What one delivery attempt produced when it did not land.
#[derive(Debug)]
struct AttemptRejected {
    reason: String,
}

impl std::fmt::Display for AttemptRejected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reason)
    }
}

/// Delivers signed HTTP payloads to external endpoints with bounded retries.
///
/// Never returns an error: callers inspect [`WebhookDelivery`]. Every
/// non-2xx response and transport fault is retried until the attempt budget
/// runs out, on the fixed exponential curve above.
pub struct WebhookDispatcher<T, S>
where
    T: WebhookTransport,
    S: PayloadSigner,
{
    pub transport: T,
    pub signer: S,
}

impl<T, S> WebhookDispatcher<T, S>
where
    T: WebhookTransport,
    S: PayloadSigner,
{
    pub async fn dispatch(
        &self,
        request: WebhookRequest,
        cancel: &CancellationToken,
    ) -> WebhookDelivery {
        let mut headers = request.headers.clone();
        headers.push((EVENT_HEADER.to_owned(), request.event_type.clone()));

        // The payload never changes between attempts, so neither does the
        // signature. A signing failure burns no attempts.
        if let Some(secret) = &request.secret {
            match self.signer.sign(request.tenant_id, secret, &request.payload) {
                Ok(signature) => headers.push((SIGNATURE_HEADER.to_owned(), signature)),
                Err(e) => {
                    warn!(
                        endpoint = %request.endpoint,
                        event_type = %request.event_type,
                        error = %e,
                        "webhook payload signing failed"
                    );
                    return WebhookDelivery {
                        delivered: false,
                        attempts: 0,
                        last_status_code: None,
                        delivered_at: None,
                        failure_reasons: vec![e.to_string()],
                    };
                }
            }
        }

        let attempts = AtomicU32::new(0);
        let failure_reasons = Mutex::new(Vec::new());
        let last_status = Mutex::new(None::<u16>);

        let policy = RetryPolicy::<AttemptRejected>::new(RetryOptions {
            max_attempts: request.max_attempts,
            base_delay: BACKOFF_BASE,
            max_delay: BACKOFF_MAX,
            attempt_timeout: None,
        })
        .with_backoff(Backoff::fixed(BACKOFF_BASE, BACKOFF_MAX));

        let outcome = policy
            .run(cancel, |attempt| {
                let attempts = &attempts;
                let failure_reasons = &failure_reasons;
                let last_status = &last_status;
                let transport = &self.transport;
                let request = &request;
                let headers = &headers;
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    let posted = transport
                        .post(
                            &request.endpoint,
                            &request.payload,
                            headers,
                            request.timeout,
                        )
                        .await;
                    match posted {
                        Ok(status) => {
                            *last_status.lock().unwrap() = Some(status);
                            if (200..300).contains(&status) {
                                Ok(status)
                            } else {
                                let reason =
                                    format!("attempt {attempt}: endpoint returned status {status}");
                                failure_reasons.lock().unwrap().push(reason.clone());
                                Err(AttemptRejected { reason })
                            }
                        }
                        Err(e) => {
                            let reason = format!("attempt {attempt}: {e}");
                            failure_reasons.lock().unwrap().push(reason.clone());
                            Err(AttemptRejected { reason })
                        }
                    }
                }
            })
            .await;

        let attempts = attempts.load(Ordering::SeqCst);
        let mut failure_reasons = failure_reasons.into_inner().unwrap_or_default();
        let last_status_code = last_status.into_inner().unwrap_or_default();

        match outcome {
            Ok(status) => {
                debug!(
                    endpoint = %request.endpoint,
                    event_type = %request.event_type,
                    attempts,
                    status,
                    "webhook delivered"
                );
                WebhookDelivery {
                    delivered: true,
                    attempts,
                    last_status_code: Some(status),
                    delivered_at: Some(Utc::now()),
                    failure_reasons,
                }
            }
            Err(e) => {
                if let RetryError::Exhausted { .. } = e {
                    failure_reasons.push("retry attempts exhausted before any delivery".to_owned());
                }
                warn!(
                    endpoint = %request.endpoint,
                    event_type = %request.event_type,
                    attempts,
                    last_status = ?last_status_code,
                    "webhook delivery failed"
                );
                WebhookDelivery {
                    delivered: false,
                    attempts,
                    last_status_code,
                    delivered_at: None,
                    failure_reasons,
                }
            }
        }
    }
}
