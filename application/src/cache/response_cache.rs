//! Exact-match response cache.
//!
//! Keys are a SHA-256 digest of the normalized request text, the remote
//! target and the request parameters, so two requests that differ only in
//! case or whitespace share an entry. Eviction is least-recently-used;
//! entries past their TTL are treated as absent on read and dropped then.

use crate::config::ResponseCacheConfig;
use crate::ports::planning_transport::RequestParams;
use crate::sync::lock;
use planner_domain::{PlanningResult, normalize_text};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Digest identifying one normalized request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn for_request(text: &str, target: &str, params: &RequestParams) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(normalize_text(text).as_bytes());
        hasher.update([0u8]);
        hasher.update(target.as_bytes());
        hasher.update([0u8]);
        hasher.update(params.model.as_bytes());
        hasher.update([0u8]);
        hasher.update(params.temperature.to_bits().to_be_bytes());
        hasher.update(params.max_tokens.to_be_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ResponseCacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub hit_rate: f64,
}

#[derive(Debug)]
struct Slot {
    value: PlanningResult,
    created_at: Instant,
    tick: u64,
}

#[derive(Debug, Default)]
struct Inner {
    slots: HashMap<CacheKey, Slot>,
    /// Access order: lowest tick is least recently used
    order: BTreeMap<u64, CacheKey>,
    next_tick: u64,
}

impl Inner {
    fn touch(&mut self, key: &CacheKey) {
        let tick = self.next_tick;
        self.next_tick += 1;
        if let Some(slot) = self.slots.get_mut(key) {
            self.order.remove(&slot.tick);
            slot.tick = tick;
            self.order.insert(tick, key.clone());
        }
    }

    fn remove(&mut self, key: &CacheKey) -> Option<Slot> {
        let slot = self.slots.remove(key)?;
        self.order.remove(&slot.tick);
        Some(slot)
    }

    fn pop_lru(&mut self) -> Option<CacheKey> {
        let (_, key) = self.order.pop_first()?;
        self.slots.remove(&key);
        Some(key)
    }
}

#[derive(Debug)]
pub struct ResponseCache {
    enabled: bool,
    capacity: usize,
    ttl: Duration,
    inner: Mutex<Inner>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl ResponseCache {
    pub fn new(config: &ResponseCacheConfig) -> Self {
        Self {
            enabled: config.enabled,
            capacity: config.capacity.max(1),
            ttl: config.ttl,
            inner: Mutex::new(Inner::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<PlanningResult> {
        if !self.enabled {
            return None;
        }
        let now = Instant::now();
        let mut inner = lock(&self.inner);

        let expired = match inner.slots.get(key) {
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Some(slot) => now.duration_since(slot.created_at) >= self.ttl,
        };

        if expired {
            inner.remove(key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(key = %truncate_key(key), "Response cache entry expired");
            return None;
        }

        inner.touch(key);
        self.hits.fetch_add(1, Ordering::Relaxed);
        inner.slots.get(key).map(|slot| slot.value.clone())
    }

    pub fn put(&self, key: CacheKey, value: PlanningResult) {
        if !self.enabled {
            return;
        }
        let mut inner = lock(&self.inner);
        inner.remove(&key);

        while inner.slots.len() >= self.capacity {
            match inner.pop_lru() {
                Some(evicted) => {
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                    debug!(key = %truncate_key(&evicted), "Response cache evicted LRU entry");
                }
                None => break,
            }
        }

        let tick = inner.next_tick;
        inner.next_tick += 1;
        inner.order.insert(tick, key.clone());
        inner.slots.insert(
            key,
            Slot {
                value,
                created_at: Instant::now(),
                tick,
            },
        );
    }

    /// Drop every expired entry now. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = lock(&self.inner);
        let expired: Vec<CacheKey> = inner
            .slots
            .iter()
            .filter(|(_, slot)| now.duration_since(slot.created_at) >= self.ttl)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            inner.remove(key);
        }
        self.expirations
            .fetch_add(expired.len() as u64, Ordering::Relaxed);
        expired.len()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = lock(&self.inner);
        inner.slots.clear();
        inner.order.clear();
    }

    pub fn stats(&self) -> ResponseCacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        ResponseCacheStats {
            entries: self.len(),
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        }
    }
}

fn truncate_key(key: &CacheKey) -> &str {
    planner_domain::truncate_str(key.as_str(), 12)
}
