//! Generic retry execution with pluggable backoff and failure classification.
//!
//! This crate knows nothing about brokers, databases, or HTTP. Call sites
//! describe an operation, a budget ([`RetryOptions`]), a delay curve
//! ([`Backoff`]), and how to tell a transient failure from a permanent one;
//! [`RetryPolicy`] runs the loop. Both the outbox publish path and the
//! webhook dispatcher execute on this one abstraction.

pub mod backoff;
pub mod executor;

pub use backoff::{Backoff, Jitter};
pub use executor::{
    AttemptFailure, FailureClass, Retryable, RetryError, RetryOptions, RetryPolicy,
};
