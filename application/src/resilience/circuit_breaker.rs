//! Circuit breaker for one remote target.
//!
//! ```text
//!   Closed --(threshold failures in window)--> Open
//!   Open --(cool-down elapsed, first caller)--> HalfOpen (probe in flight)
//!   HalfOpen --probe ok--> Closed      HalfOpen --probe failed--> Open (longer cool-down)
//! ```
//!
//! Only one probe runs at a time. Callers arriving while it is outstanding
//! are rejected exactly as if the breaker were still Open.
//!
//! Every admission carries a [`Ticket`] stamped with the breaker's epoch,
//! which advances on each state change and each granted probe. Outcomes are
//! only counted for tickets of the current epoch, so a call admitted before
//! the circuit opened can never decide a probe's verdict.

use crate::config::CircuitBreakerConfig;
use crate::sync::lock;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Proof of admission, handed back with the call's outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

/// Answer to [`CircuitBreaker::admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Circuit closed; call normally
    Allowed(Ticket),
    /// The single trial call; its outcome decides the next state
    Probe(Ticket),
    /// Fail fast without calling
    Rejected,
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Admission::Rejected)
    }

    pub fn is_probe(&self) -> bool {
        matches!(self, Admission::Probe(_))
    }

    fn ticket(&self) -> Option<Ticket> {
        match self {
            Admission::Allowed(ticket) | Admission::Probe(ticket) => Some(*ticket),
            Admission::Rejected => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub transitions: u64,
    pub rejected_calls: u64,
    pub recent_failures: usize,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
    cooldown: Duration,
    probe_in_flight: bool,
    epoch: u64,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    target: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
    transitions: AtomicU64,
    rejected: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(target: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let cooldown = config.cooldown;
        Self {
            target: target.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failures: VecDeque::new(),
                opened_at: None,
                cooldown,
                probe_in_flight: false,
                epoch: 0,
            }),
            transitions: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Current state as a caller would experience it. No side effects:
    /// an Open breaker whose cool-down has elapsed reports HalfOpen
    /// without transitioning.
    pub fn state(&self) -> CircuitState {
        let inner = lock(&self.inner);
        match inner.state {
            CircuitState::Open if Self::cooldown_elapsed(&inner, Instant::now()) => {
                CircuitState::HalfOpen
            }
            state => state,
        }
    }

    /// Current cool-down (grows after failed probes).
    pub fn cooldown(&self) -> Duration {
        lock(&self.inner).cooldown
    }

    /// Ask permission for one call.
    pub fn admit(&self) -> Admission {
        let now = Instant::now();
        let mut inner = lock(&self.inner);
        let admission = match inner.state {
            CircuitState::Closed => Admission::Allowed(Ticket(inner.epoch)),
            CircuitState::Open if Self::cooldown_elapsed(&inner, now) => {
                self.move_to(&mut inner, CircuitState::HalfOpen);
                inner.probe_in_flight = true;
                Admission::Probe(Ticket(inner.epoch))
            }
            CircuitState::HalfOpen if !inner.probe_in_flight => {
                inner.epoch += 1;
                inner.probe_in_flight = true;
                Admission::Probe(Ticket(inner.epoch))
            }
            CircuitState::Open | CircuitState::HalfOpen => Admission::Rejected,
        };
        if admission == Admission::Rejected {
            self.rejected.fetch_add(1, Ordering::Relaxed);
        }
        admission
    }

    pub fn record_success(&self, admission: Admission) {
        let mut inner = lock(&self.inner);
        if !self.is_current(&inner, admission) {
            return;
        }
        match inner.state {
            CircuitState::HalfOpen => {
                inner.failures.clear();
                inner.opened_at = None;
                inner.cooldown = self.config.cooldown;
                inner.probe_in_flight = false;
                self.move_to(&mut inner, CircuitState::Closed);
            }
            CircuitState::Closed => inner.failures.clear(),
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self, admission: Admission) {
        let now = Instant::now();
        let mut inner = lock(&self.inner);
        if !self.is_current(&inner, admission) {
            return;
        }
        match inner.state {
            CircuitState::Closed => {
                let window = self.config.failure_window;
                while let Some(oldest) = inner.failures.front() {
                    if now.duration_since(*oldest) >= window {
                        inner.failures.pop_front();
                    } else {
                        break;
                    }
                }
                inner.failures.push_back(now);
                if inner.failures.len() >= self.config.failure_threshold as usize {
                    inner.opened_at = Some(now);
                    inner.cooldown = self.config.cooldown;
                    self.move_to(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                let grown = Duration::try_from_secs_f64(
                    inner.cooldown.as_secs_f64() * self.config.cooldown_multiplier,
                )
                .unwrap_or(self.config.max_cooldown)
                .min(self.config.max_cooldown);
                inner.cooldown = grown;
                inner.opened_at = Some(now);
                inner.probe_in_flight = false;
                self.move_to(&mut inner, CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    /// Give back a probe that never produced a verdict (cancelled before
    /// the call, or answered with a terminal error). The next caller may
    /// probe instead.
    pub fn abandon_probe(&self, admission: Admission) {
        let mut inner = lock(&self.inner);
        if admission.is_probe()
            && self.is_current(&inner, admission)
            && inner.state == CircuitState::HalfOpen
        {
            inner.probe_in_flight = false;
        }
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let state = self.state();
        let recent_failures = lock(&self.inner).failures.len();
        CircuitBreakerStats {
            state,
            transitions: self.transitions.load(Ordering::Relaxed),
            rejected_calls: self.rejected.load(Ordering::Relaxed),
            recent_failures,
        }
    }

    fn is_current(&self, inner: &Inner, admission: Admission) -> bool {
        match admission.ticket() {
            Some(Ticket(epoch)) if epoch == inner.epoch => true,
            Some(_) => {
                debug!(
                    target_name = %self.target,
                    state = %inner.state,
                    "Ignoring outcome of a call admitted before the last state change"
                );
                false
            }
            None => false,
        }
    }

    fn cooldown_elapsed(inner: &Inner, now: Instant) -> bool {
        inner
            .opened_at
            .is_some_and(|opened| now.duration_since(opened) >= inner.cooldown)
    }

    fn move_to(&self, inner: &mut Inner, next: CircuitState) {
        let previous = inner.state;
        inner.state = next;
        inner.epoch += 1;
        self.transitions.fetch_add(1, Ordering::Relaxed);
        match next {
            CircuitState::Open => warn!(
                target_name = %self.target,
                from = %previous,
                cooldown_ms = inner.cooldown.as_millis() as u64,
                "Circuit opened"
            ),
            _ => info!(target_name = %self.target, from = %previous, to = %next, "Circuit state changed"),
        }
    }
}
