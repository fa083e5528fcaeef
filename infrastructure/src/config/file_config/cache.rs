//! `[response_cache]` and `[semantic_cache]` sections.

use planner_application::{ResponseCacheConfig, SemanticCacheConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileCacheConfig {
    pub enabled: bool,
    pub capacity: usize,
    pub ttl_secs: u64,
}

impl Default for FileCacheConfig {
    fn default() -> Self {
        let defaults = ResponseCacheConfig::default();
        Self {
            enabled: defaults.enabled,
            capacity: defaults.capacity,
            ttl_secs: defaults.ttl.as_secs(),
        }
    }
}

impl From<&FileCacheConfig> for ResponseCacheConfig {
    fn from(file: &FileCacheConfig) -> Self {
        Self {
            enabled: file.enabled,
            capacity: file.capacity,
            ttl: Duration::from_secs(file.ttl_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSemanticCacheConfig {
    pub enabled: bool,
    pub capacity: usize,
    /// Cosine similarity needed for a hit (0.0 - 1.0)
    pub min_similarity: f32,
    pub max_age_secs: u64,
    /// Executions before the success rate counts
    pub min_executions: u32,
    pub min_success_rate: f64,
}

impl Default for FileSemanticCacheConfig {
    fn default() -> Self {
        let defaults = SemanticCacheConfig::default();
        Self {
            enabled: defaults.enabled,
            capacity: defaults.capacity,
            min_similarity: defaults.min_similarity,
            max_age_secs: defaults.max_age.as_secs(),
            min_executions: defaults.min_executions,
            min_success_rate: defaults.min_success_rate,
        }
    }
}

impl From<&FileSemanticCacheConfig> for SemanticCacheConfig {
    fn from(file: &FileSemanticCacheConfig) -> Self {
        Self {
            enabled: file.enabled,
            capacity: file.capacity,
            min_similarity: file.min_similarity,
            max_age: Duration::from_secs(file.max_age_secs),
            min_executions: file.min_executions,
            min_success_rate: file.min_success_rate,
        }
    }
}
