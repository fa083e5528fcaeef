//! Exponential backoff between retry attempts.

use crate::config::RetryConfig;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    base: Duration,
    cap: Duration,
}

impl BackoffPolicy {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.base_delay, config.max_delay)
    }

    /// Delay before retry number `retry` (1 = first retry): `base * 2^(retry-1)`, capped.
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// Like [`delay`](Self::delay) but never shorter than a remote hint.
    /// The cap still applies.
    pub fn delay_with_hint(&self, retry: u32, hint: Option<Duration>) -> Duration {
        let delay = self.delay(retry);
        match hint {
            Some(hint) => delay.max(hint).min(self.cap),
            None => delay,
        }
    }
}
