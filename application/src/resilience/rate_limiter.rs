//! Rate limiter shared by every agent calling one target.
//!
//! A direct (unkeyed) GCRA limiter: `quota` calls may burst at once and one
//! permit is replenished every `window / quota`. Time comes from tokio so
//! the limiter follows a paused test clock.

use crate::config::RateLimitConfig;
use governor::Quota;
use governor::clock::Clock;
use governor::middleware::NoOpMiddleware;
use governor::nanos::Nanos;
use governor::state::{InMemoryState, NotKeyed};
use serde::Serialize;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

type DirectLimiter<C> =
    governor::RateLimiter<NotKeyed, InMemoryState, C, NoOpMiddleware<<C as Clock>::Instant>>;

/// [`Clock`] reading tokio time, relative to when it was created.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: Instant,
}

impl Default for TokioClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    type Instant = Nanos;

    fn now(&self) -> Nanos {
        Nanos::from(self.origin.elapsed())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimiterStats {
    pub granted: u64,
    pub rejected: u64,
}

pub struct RateLimiter<C: Clock = TokioClock> {
    limiter: DirectLimiter<C>,
    clock: C,
    granted: AtomicU64,
    rejected: AtomicU64,
}

impl RateLimiter {
    pub fn new(quota: u32, window: Duration) -> Self {
        Self::with_clock(quota, window, TokioClock::default())
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.quota, config.window)
    }
}

impl<C: Clock> RateLimiter<C> {
    /// A zero quota is treated as one call per window.
    pub fn with_clock(quota: u32, window: Duration, clock: C) -> Self
    where
        C: Clone,
    {
        let burst = NonZeroU32::new(quota).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::with_period(window / burst.get())
            .map_or_else(|| Quota::per_second(NonZeroU32::MAX), |q| q.allow_burst(burst));
        Self {
            limiter: DirectLimiter::direct_with_clock(quota, clock.clone()),
            clock,
            granted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Take a permit if one is free. Never waits.
    pub fn try_acquire(&self) -> bool {
        match self.reserve() {
            Ok(()) => true,
            Err(_) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Wait up to `budget` for a permit.
    ///
    /// Sleeps only when the next permit is due inside the budget; returns
    /// `false` immediately otherwise.
    pub async fn acquire_within(&self, budget: Duration) -> bool {
        let give_up_at = Instant::now() + budget;
        loop {
            match self.reserve() {
                Ok(()) => return true,
                Err(wait) if Instant::now() + wait <= give_up_at => {
                    tokio::time::sleep(wait).await;
                }
                Err(_) => {
                    self.rejected.fetch_add(1, Ordering::Relaxed);
                    return false;
                }
            }
        }
    }

    pub fn stats(&self) -> RateLimiterStats {
        RateLimiterStats {
            granted: self.granted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }

    fn reserve(&self) -> Result<(), Duration> {
        match self.limiter.check() {
            Ok(()) => {
                self.granted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(not_until) => Err(not_until.wait_time_from(self.clock.now())),
        }
    }
}

impl<C: Clock> std::fmt::Debug for RateLimiter<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use governor::clock::FakeRelativeClock;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_quota_exhausted_within_window() {
        let limiter = RateLimiter::new(3, Duration::from_secs(10));
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
        assert!(!limiter.try_acquire());
        assert_eq!(
            limiter.stats(),
            RateLimiterStats {
                granted: 3,
                rejected: 2
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_permit_replenished_per_period() {
        // 2 per 10s: one permit back every 5s
        let limiter = RateLimiter::new(2, Duration::from_secs(10));
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(!limiter.try_acquire());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn test_fake_clock_drives_replenishment() {
        let clock = FakeRelativeClock::default();
        let limiter = RateLimiter::with_clock(4, Duration::from_secs(2), clock.clone());
        for _ in 0..4 {
            assert!(limiter.try_acquire());
        }
        assert!(!limiter.try_acquire());

        clock.advance(Duration::from_millis(499));
        assert!(!limiter.try_acquire());
        clock.advance(Duration::from_millis(1));
        assert!(limiter.try_acquire());
        assert_eq!(limiter.stats().granted, 5);
        assert_eq!(limiter.stats().rejected, 2);
    }

    #[test]
    fn test_zero_quota_allows_one_per_window() {
        let clock = FakeRelativeClock::default();
        let limiter = RateLimiter::with_clock(0, Duration::from_secs(1), clock.clone());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
        clock.advance(Duration::from_secs(1));
        assert!(limiter.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_within_waits_for_next_permit() {
        let limiter = RateLimiter::new(1, Duration::from_millis(100));
        assert!(limiter.try_acquire());

        let start = Instant::now();
        assert!(limiter.acquire_within(Duration::from_millis(250)).await);
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert!(start.elapsed() <= Duration::from_millis(101));
        assert_eq!(limiter.stats().granted, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_within_gives_up_immediately() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.try_acquire());

        let start = Instant::now();
        assert!(!limiter.acquire_within(Duration::from_millis(250)).await);
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.stats().rejected, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_acquire_never_exceeds_quota() {
        let limiter = Arc::new(RateLimiter::new(25, Duration::from_secs(3600)));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                (0..20).filter(|_| limiter.try_acquire()).count()
            }));
        }
        let mut total = 0;
        for handle in handles {
            total += handle.await.unwrap();
        }
        assert_eq!(total, 25);
        assert_eq!(limiter.stats().granted, 25);
        assert_eq!(limiter.stats().rejected, 135);
    }
}
