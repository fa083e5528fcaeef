//! Cache parameters for the exact response cache and the semantic plan cache.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct ResponseCacheConfig {
    pub enabled: bool,
    pub capacity: usize,
    /// Entries older than this are treated as absent.
    pub ttl: Duration,
}

impl Default for ResponseCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 500,
            ttl: Duration::from_secs(5 * 60),
        }
    }
}

/// Semantic cache tuning.
///
/// `min_success_rate` only applies once an entry has been executed at least
/// `min_executions` times; younger entries are never judged on outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticCacheConfig {
    pub enabled: bool,
    pub capacity: usize,
    pub min_similarity: f32,
    pub max_age: Duration,
    pub min_executions: u32,
    pub min_success_rate: f64,
}

impl Default for SemanticCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 100,
            min_similarity: 0.75,
            max_age: Duration::from_secs(24 * 60 * 60),
            min_executions: 3,
            min_success_rate: 0.4,
        }
    }
}

impl SemanticCacheConfig {
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_min_similarity(mut self, similarity: f32) -> Self {
        self.min_similarity = similarity;
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let exact = ResponseCacheConfig::default();
        assert_eq!(exact.capacity, 500);
        assert_eq!(exact.ttl, Duration::from_secs(300));

        let semantic = SemanticCacheConfig::default();
        assert_eq!(semantic.capacity, 100);
        assert_eq!(semantic.min_similarity, 0.75);
        assert_eq!(semantic.max_age, Duration::from_secs(86_400));
        assert_eq!(semantic.min_executions, 3);
        assert_eq!(semantic.min_success_rate, 0.4);
    }
}
