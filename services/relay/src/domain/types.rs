use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use courier_retry::RetryOptions;

/// One pending outbound delivery, as claimed from the durable store.
#[derive(Debug, Clone)]
pub struct OutboxRecord {
    pub id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub topic: String,
    pub headers: BTreeMap<String, String>,
    pub payload: serde_json::Value,
    pub message_type: String,
    pub created_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub attempts: i32,
    pub last_error: Option<String>,
}

/// The unit handed to the message publisher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub message: serde_json::Value,
    pub topic: String,
    pub tenant_id: Option<Uuid>,
    pub headers: BTreeMap<String, String>,
}

/// Knobs for one outbox dispatch cycle.
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// Max records claimed per cycle.
    pub batch_size: u64,
    /// Per-record retry budget across cycles; zero or negative disables the cap.
    pub max_attempts: i32,
    /// How long a claim lease stays valid. A crashed dispatcher's claims
    /// become reclaimable once this lapses.
    pub lease_ttl: Duration,
    /// In-cycle retry for each record's broker publish.
    pub publish_retry: RetryOptions,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_attempts: 5,
            lease_ttl: Duration::from_secs(30),
            publish_retry: RetryOptions::default(),
        }
    }
}

/// Outcome counters for one dispatch cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub claimed: usize,
    pub published: usize,
    pub failed: usize,
}

/// One outbound webhook delivery request.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    pub endpoint: String,
    /// HMAC key; when present the payload signature is attached as a header.
    pub secret: Option<String>,
    pub tenant_id: Option<Uuid>,
    pub event_type: String,
    /// Opaque JSON payload, posted verbatim as the request body.
    pub payload: String,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
    pub max_attempts: u32,
}

/// Webhook delivery outcome. Never an error: callers inspect `delivered`
/// and `failure_reasons`.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookDelivery {
    pub delivered: bool,
    pub attempts: u32,
    pub last_status_code: Option<u16>,
    #[serde(serialize_with = "courier_core::serde::opt_to_rfc3339_ms")]
    pub delivered_at: Option<DateTime<Utc>>,
    /// One entry per failed attempt, oldest first.
    pub failure_reasons: Vec<String>,
}
