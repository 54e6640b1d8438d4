use std::time::Duration;

use rand::RngExt;

/// How the computed exponential cap is turned into an actual delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Jitter {
    /// Draw uniformly from `[0, cap]` — avoids synchronized retry storms.
    Full,
    /// Use the cap itself.
    None,
}

/// Exponential backoff curve: cap for attempt `n` is `min(base * 2^(n-1), max)`.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: Jitter,
}

impl Backoff {
    /// Full-jitter exponential backoff — the default for broker publishes.
    pub fn full_jitter(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            jitter: Jitter::Full,
        }
    }

    /// Deterministic exponential backoff — the webhook delivery curve.
    pub fn fixed(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            jitter: Jitter::None,
        }
    }

    /// Upper bound for attempt `n`, with `n` clamped to >= 1.
    pub fn cap(&self, attempt: u32) -> Duration {
        let exponent = attempt.max(1) - 1;
        let base_ms = self.base.as_millis().min(u128::from(u64::MAX)) as u64;
        let cap_ms = base_ms.saturating_mul(2u64.saturating_pow(exponent.min(63)));
        let max_ms = self.max.as_millis().min(u128::from(u64::MAX)) as u64;
        Duration::from_millis(cap_ms.min(max_ms))
    }

    /// Delay to sleep before the attempt following attempt `n`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let cap = self.cap(attempt);
        match self.jitter {
            Jitter::None => cap,
            Jitter::Full => {
                let cap_ms = cap.as_millis() as u64;
                if cap_ms == 0 {
                    return Duration::ZERO;
                }
                let mut rng = rand::rng();
                Duration::from_millis(rng.random_range(0..=cap_ms))
            }
        }
    }
}
