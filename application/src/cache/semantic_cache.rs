//! Semantic plan cache.
//!
//! Stores plans under an embedding of the goal text and serves them to
//! later goals whose embedding is close enough (cosine similarity at or
//! above the configured threshold). Entries remember how often their plan
//! was executed and how often that succeeded; [`SemanticCache::cleanup`]
//! drops entries that are too old or that perform poorly, so the cache
//! gets better with use.
//!
//! Lookups and outcome recording run under a read lock and touch only
//! atomics, so concurrent lookups never wait on each other. Only `store`,
//! eviction and cleanup take the write lock.

use crate::config::SemanticCacheConfig;
use crate::sync::{read, write};
use planner_domain::{EmbeddingVector, EntryId, PlanningResult, TextEmbedder, normalize_text};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::time::Instant;
use tracing::{debug, info};

/// A plan found by [`SemanticCache::find_similar`].
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticHit {
    pub entry_id: EntryId,
    pub similarity: f32,
    pub plan: PlanningResult,
}

/// Execution record of one entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EntryOutcomes {
    pub executions: u32,
    pub successes: u32,
}

impl EntryOutcomes {
    pub fn success_rate(&self) -> Option<f64> {
        if self.executions == 0 {
            return None;
        }
        Some(f64::from(self.successes) / f64::from(self.executions))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SemanticCacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub evictions: u64,
    pub removed_by_cleanup: u64,
    pub hit_rate: f64,
}

#[derive(Debug)]
struct Entry {
    id: EntryId,
    text: String,
    embedding: EmbeddingVector,
    plan: PlanningResult,
    created_at: Instant,
    last_access: AtomicU64,
    executions: AtomicU32,
    successes: AtomicU32,
}

impl Entry {
    fn outcomes(&self) -> EntryOutcomes {
        // Successes are bumped after executions, so read them first
        let successes = self.successes.load(Ordering::Acquire);
        let executions = self.executions.load(Ordering::Acquire);
        EntryOutcomes {
            executions,
            successes: successes.min(executions),
        }
    }
}

pub struct SemanticCache {
    config: SemanticCacheConfig,
    embedder: Arc<dyn TextEmbedder>,
    entries: RwLock<HashMap<EntryId, Entry>>,
    next_id: AtomicU64,
    clock: AtomicU64,
    cleaning: AtomicBool,
    hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
    evictions: AtomicU64,
    removed_by_cleanup: AtomicU64,
}

impl SemanticCache {
    pub fn new(config: SemanticCacheConfig, embedder: Arc<dyn TextEmbedder>) -> Self {
        Self {
            config,
            embedder,
            entries: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            clock: AtomicU64::new(0),
            cleaning: AtomicBool::new(false),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            stores: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            removed_by_cleanup: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &SemanticCacheConfig {
        &self.config
    }

    /// Best stored plan at or above the configured similarity threshold.
    pub fn find_similar(&self, text: &str) -> Option<SemanticHit> {
        self.find_similar_with(text, self.config.min_similarity)
    }

    /// Best stored plan at or above `min_similarity`.
    ///
    /// Stale entries and entries with a proven poor success rate are never
    /// served. Entries whose embedding cannot be compared (different
    /// dimension) are skipped.
    pub fn find_similar_with(&self, text: &str, min_similarity: f32) -> Option<SemanticHit> {
        if !self.config.enabled {
            return None;
        }
        let query = self.embedder.embed(text);
        if query.is_zero() {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let now = Instant::now();
        let entries = read(&self.entries);
        let best = entries
            .values()
            .filter(|entry| !self.is_stale(entry, now) && !self.is_underperforming(entry))
            .filter_map(|entry| {
                let similarity = entry.embedding.cosine_similarity(&query).ok()?;
                (similarity >= min_similarity).then_some((entry, similarity))
            })
            .max_by(|(_, a), (_, b)| a.total_cmp(b));

        match best {
            Some((entry, similarity)) => {
                entry.last_access.store(self.tick(), Ordering::Relaxed);
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(
                    entry = %entry.id,
                    similarity,
                    stored_text = %entry.text,
                    "Semantic cache hit"
                );
                Some(SemanticHit {
                    entry_id: entry.id,
                    similarity,
                    plan: entry.plan.clone(),
                })
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store `plan` for `text`, evicting the least recently used entry when
    /// full. Storing the same normalized text again replaces the plan and
    /// resets its outcome record.
    ///
    /// Returns `None` when the cache is disabled or the text has nothing to
    /// embed.
    pub fn store(&self, text: &str, plan: PlanningResult) -> Option<EntryId> {
        if !self.config.enabled {
            return None;
        }
        let embedding = self.embedder.embed(text);
        if embedding.is_zero() {
            return None;
        }
        let normalized = normalize_text(text);
        let now = Instant::now();
        let tick = self.tick();

        let mut entries = write(&self.entries);

        let existing = entries
            .values()
            .find(|entry| entry.text == normalized)
            .map(|entry| entry.id);
        if let Some(id) = existing {
            entries.remove(&id);
        } else if entries.len() >= self.config.capacity {
            self.evict_lru(&mut entries);
        }

        let id = existing.unwrap_or_else(|| EntryId::new(self.next_id.fetch_add(1, Ordering::Relaxed)));
        entries.insert(
            id,
            Entry {
                id,
                text: normalized,
                embedding,
                plan,
                created_at: now,
                last_access: AtomicU64::new(tick),
                executions: AtomicU32::new(0),
                successes: AtomicU32::new(0),
            },
        );
        self.stores.fetch_add(1, Ordering::Relaxed);
        debug!(entry = %id, entries = entries.len(), "Semantic cache stored plan");
        Some(id)
    }

    /// Record one execution of the plan stored under `entry_id`.
    ///
    /// Returns `false` if the entry no longer exists.
    pub fn record_outcome(&self, entry_id: EntryId, success: bool) -> bool {
        let entries = read(&self.entries);
        let Some(entry) = entries.get(&entry_id) else {
            return false;
        };
        entry.executions.fetch_add(1, Ordering::AcqRel);
        if success {
            entry.successes.fetch_add(1, Ordering::AcqRel);
        }
        true
    }

    /// Remove entries older than `max_age`, and entries executed at least
    /// `min_executions` times whose success rate is below
    /// `min_success_rate`. Returns the number removed.
    ///
    /// Concurrent calls do not stack: while one cleanup runs, others
    /// return 0 immediately.
    pub fn cleanup(&self) -> usize {
        if self
            .cleaning
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return 0;
        }

        let now = Instant::now();
        let removed = {
            let mut entries = write(&self.entries);
            let before = entries.len();
            entries.retain(|_, entry| !self.is_stale(entry, now) && !self.is_underperforming(entry));
            before - entries.len()
        };
        self.cleaning.store(false, Ordering::Release);

        self.removed_by_cleanup
            .fetch_add(removed as u64, Ordering::Relaxed);
        if removed > 0 {
            info!(removed, "Semantic cache cleanup removed entries");
        }
        removed
    }

    pub fn outcomes(&self, entry_id: EntryId) -> Option<EntryOutcomes> {
        read(&self.entries).get(&entry_id).map(Entry::outcomes)
    }

    pub fn contains(&self, entry_id: EntryId) -> bool {
        read(&self.entries).contains_key(&entry_id)
    }

    pub fn len(&self) -> usize {
        read(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        write(&self.entries).clear();
    }

    pub fn stats(&self) -> SemanticCacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        SemanticCacheStats {
            entries: self.len(),
            hits,
            misses,
            stores: self.stores.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            removed_by_cleanup: self.removed_by_cleanup.load(Ordering::Relaxed),
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    fn is_stale(&self, entry: &Entry, now: Instant) -> bool {
        now.duration_since(entry.created_at) > self.config.max_age
    }

    fn is_underperforming(&self, entry: &Entry) -> bool {
        let outcomes = entry.outcomes();
        if outcomes.executions < self.config.min_executions {
            return false;
        }
        outcomes
            .success_rate()
            .is_some_and(|rate| rate < self.config.min_success_rate)
    }

    fn evict_lru(&self, entries: &mut HashMap<EntryId, Entry>) {
        let victim = entries
            .values()
            .min_by_key(|entry| entry.last_access.load(Ordering::Relaxed))
            .map(|entry| entry.id);
        if let Some(id) = victim {
            entries.remove(&id);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            debug!(entry = %id, "Semantic cache evicted LRU entry");
        }
    }
}

impl std::fmt::Debug for SemanticCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticCache")
            .field("entries", &self.len())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use planner_domain::{NgramEmbedder, RequestId, Task};
    use std::time::Duration;

    /// Embedder with hand-picked vectors so similarities are exact.
    struct TableEmbedder(Vec<(&'static str, Vec<f32>)>);

    impl TextEmbedder for TableEmbedder {
        fn embed(&self, text: &str) -> EmbeddingVector {
            self.0
                .iter()
                .find(|(t, _)| *t == text)
                .map(|(_, v)| EmbeddingVector::new(v.clone()))
                .unwrap_or_else(|| EmbeddingVector::zeros(2))
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    fn plan(kind: &str) -> PlanningResult {
        PlanningResult::remote(
            RequestId::generate(),
            vec![Task::new(kind)],
            kind,
            Duration::from_millis(500),
            1,
        )
    }

    fn ngram_cache() -> SemanticCache {
        SemanticCache::new(SemanticCacheConfig::default(), Arc::new(NgramEmbedder::default()))
    }

    fn table_cache(config: SemanticCacheConfig) -> SemanticCache {
        SemanticCache::new(
            config,
            Arc::new(TableEmbedder(vec![
                ("build a small shelter", vec![1.0, 0.0]),
                // cos = 0.9
                ("construct a tiny house", vec![0.9, 0.435_889_9]),
                // cos = 0.7
                ("dig a basement", vec![0.7, 0.714_142_8]),
                ("attack the zombie", vec![0.0, 1.0]),
            ])),
        )
    }

    #[test]
    fn test_same_text_has_similarity_one() {
        let cache = ngram_cache();
        let id = cache.store("build a small shelter", plan("build")).unwrap();

        let hit = cache.find_similar("build a small shelter").unwrap();
        assert_eq!(hit.entry_id, id);
        assert!((hit.similarity - 1.0).abs() < 1e-5);
        assert_eq!(hit.plan.tasks[0].kind, "build");
    }

    #[test]
    fn test_hit_at_or_above_threshold() {
        let cache = table_cache(SemanticCacheConfig::default());
        cache.store("build a small shelter", plan("build")).unwrap();

        let hit = cache.find_similar("construct a tiny house").unwrap();
        assert!((hit.similarity - 0.9).abs() < 1e-4);
        assert_eq!(hit.plan.tasks[0].kind, "build");
    }

    #[test]
    fn test_miss_below_threshold() {
        let cache = table_cache(SemanticCacheConfig::default());
        cache.store("build a small shelter", plan("build")).unwrap();

        assert!(cache.find_similar("dig a basement").is_none());
        assert!(cache.find_similar_with("dig a basement", 0.6).is_some());
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_returns_most_similar_entry() {
        let cache = table_cache(SemanticCacheConfig::default().with_min_similarity(0.0));
        cache.store("attack the zombie", plan("attack")).unwrap();
        cache.store("construct a tiny house", plan("build")).unwrap();

        let hit = cache.find_similar("build a small shelter").unwrap();
        assert_eq!(hit.plan.tasks[0].kind, "build");
    }

    #[test]
    fn test_lru_eviction_at_capacity() {
        let cache = table_cache(SemanticCacheConfig::default().with_capacity(2));
        let shelter = cache.store("build a small shelter", plan("build")).unwrap();
        let zombie = cache.store("attack the zombie", plan("attack")).unwrap();
        // Touch the shelter so the zombie entry is least recently used
        cache.find_similar("build a small shelter").unwrap();

        let basement = cache.store("dig a basement", plan("mine")).unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.contains(shelter));
        assert!(!cache.contains(zombie));
        assert!(cache.contains(basement));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_store_same_text_replaces_entry() {
        let cache = ngram_cache();
        let first = cache.store("gather wood", plan("gather")).unwrap();
        cache.record_outcome(first, false);
        let second = cache.store("Gather  WOOD", plan("collect")).unwrap();

        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.outcomes(first).unwrap().executions, 0);
        assert_eq!(
            cache.find_similar("gather wood").unwrap().plan.tasks[0].kind,
            "collect"
        );
    }

    #[test]
    fn test_unembeddable_text_is_not_stored() {
        let cache = ngram_cache();
        assert!(cache.store("go to it", plan("move")).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_record_outcome() {
        let cache = ngram_cache();
        let id = cache.store("mine iron ore", plan("mine")).unwrap();
        assert!(cache.record_outcome(id, true));
        assert!(cache.record_outcome(id, false));

        let outcomes = cache.outcomes(id).unwrap();
        assert_eq!(outcomes.executions, 2);
        assert_eq!(outcomes.successes, 1);
        assert_eq!(outcomes.success_rate(), Some(0.5));
        assert!(!cache.record_outcome(EntryId::new(999), true));
    }

    #[test]
    fn test_cleanup_removes_poor_performers_only_after_min_executions() {
        let cache = table_cache(SemanticCacheConfig::default());
        let poor = cache.store("build a small shelter", plan("build")).unwrap();
        let young = cache.store("attack the zombie", plan("attack")).unwrap();

        // 1 of 5 succeeded: 20% < 40%
        cache.record_outcome(poor, true);
        for _ in 0..4 {
            cache.record_outcome(poor, false);
        }
        // Two failures, but fewer than min_executions
        cache.record_outcome(young, false);
        cache.record_outcome(young, false);

        assert_eq!(cache.cleanup(), 1);
        assert!(!cache.contains(poor));
        assert!(cache.contains(young));
        assert_eq!(cache.stats().removed_by_cleanup, 1);
    }

    #[test]
    fn test_underperforming_entry_not_served_before_cleanup() {
        let cache = table_cache(SemanticCacheConfig::default());
        let id = cache.store("build a small shelter", plan("build")).unwrap();
        for _ in 0..3 {
            cache.record_outcome(id, false);
        }
        assert!(cache.find_similar("build a small shelter").is_none());
    }

    #[test]
    fn test_good_performer_survives_cleanup() {
        let cache = table_cache(SemanticCacheConfig::default());
        let id = cache.store("build a small shelter", plan("build")).unwrap();
        for success in [true, true, false, true, false] {
            cache.record_outcome(id, success);
        }
        assert_eq!(cache.cleanup(), 0);
        assert!(cache.contains(id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_removes_stale_entries() {
        let cache = table_cache(
            SemanticCacheConfig::default().with_max_age(Duration::from_secs(3600)),
        );
        let old = cache.store("build a small shelter", plan("build")).unwrap();
        tokio::time::advance(Duration::from_secs(1800)).await;
        let fresh = cache.store("attack the zombie", plan("attack")).unwrap();
        tokio::time::advance(Duration::from_secs(1801)).await;

        assert!(cache.find_similar("build a small shelter").is_none());
        assert_eq!(cache.cleanup(), 1);
        assert!(!cache.contains(old));
        assert!(cache.contains(fresh));
    }

    #[test]
    fn test_disabled_cache() {
        let cache = SemanticCache::new(
            SemanticCacheConfig {
                enabled: false,
                ..SemanticCacheConfig::default()
            },
            Arc::new(NgramEmbedder::default()),
        );
        assert!(cache.store("build a house", plan("build")).is_none());
        assert!(cache.find_similar("build a house").is_none());
    }

    #[test]
    fn test_concurrent_lookups_and_outcomes() {
        let cache = Arc::new(ngram_cache());
        let id = cache.store("harvest wheat", plan("gather")).unwrap();

        std::thread::scope(|scope| {
            for _ in 0..4 {
                let cache = cache.clone();
                scope.spawn(move || {
                    for i in 0..50 {
                        let _ = cache.find_similar("harvest wheat");
                        cache.record_outcome(id, i % 2 == 0);
                    }
                });
            }
        });

        let outcomes = cache.outcomes(id).unwrap();
        assert_eq!(outcomes.executions, 200);
        assert_eq!(outcomes.successes, 100);
    }
}
