use std::time::Duration;

use serde::Deserialize;

use courier_core::Config;
use courier_retry::RetryOptions;

use crate::domain::types::DispatchOptions;

/// Relay service configuration loaded from environment variables
/// (field names uppercased, e.g. `DATABASE_URL`, `RELAY_BATCH_SIZE`).
#[derive(Debug, Deserialize)]
pub struct RelayConfig {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Max records claimed per dispatch cycle.
    #[serde(default = "default_batch_size")]
    pub relay_batch_size: u64,
    /// Per-record retry budget across cycles; 0 disables the cap.
    #[serde(default = "default_max_attempts")]
    pub relay_max_attempts: i32,
    /// Milliseconds between dispatch cycles.
    #[serde(default = "default_poll_interval_ms")]
    pub relay_poll_interval_ms: u64,
    /// Milliseconds a claim lease stays valid.
    #[serde(default = "default_lease_ttl_ms")]
    pub relay_lease_ttl_ms: u64,
    /// Broker publish attempts per record per cycle.
    #[serde(default = "default_publish_attempts")]
    pub relay_publish_attempts: u32,
    /// Base publish backoff in milliseconds.
    #[serde(default = "default_publish_base_delay_ms")]
    pub relay_publish_base_delay_ms: u64,
    /// Publish backoff ceiling in milliseconds.
    #[serde(default = "default_publish_max_delay_ms")]
    pub relay_publish_max_delay_ms: u64,
    /// Message types the dispatcher accepts, comma-separated.
    #[serde(default = "default_message_types")]
    pub relay_message_types: String,
}

impl Config for RelayConfig {}

fn default_batch_size() -> u64 {
    50
}
fn default_max_attempts() -> i32 {
    5
}
fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_lease_ttl_ms() -> u64 {
    30_000
}
fn default_publish_attempts() -> u32 {
    3
}
fn default_publish_base_delay_ms() -> u64 {
    100
}
fn default_publish_max_delay_ms() -> u64 {
    5_000
}
fn default_message_types() -> String {
    "json".to_owned()
}

impl RelayConfig {
    pub fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            batch_size: self.relay_batch_size,
            max_attempts: self.relay_max_attempts,
            lease_ttl: Duration::from_millis(self.relay_lease_ttl_ms),
            publish_retry: RetryOptions {
                max_attempts: self.relay_publish_attempts,
                base_delay: Duration::from_millis(self.relay_publish_base_delay_ms),
                max_delay: Duration::from_millis(self.relay_publish_max_delay_ms),
                attempt_timeout: None,
            },
        }
    }

    pub fn message_types(&self) -> Vec<String> {
        self.relay_message_types
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_owned)
            .collect()
    }
}
