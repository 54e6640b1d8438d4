//! Ambient plumbing shared across all Courier crates.
//!
//! Nothing in here knows about outboxes, brokers, or webhooks — only the
//! cross-cutting concerns every service binary needs at startup.

pub mod config;
pub mod serde;
pub mod tracing;

pub use config::Config;
pub use tracing::init_tracing;
