//! Plan caches.
//!
//! - [`ResponseCache`]: exact match on normalized text and request parameters
//! - [`SemanticCache`]: nearest stored goal by embedding similarity, with
//!   execution feedback

pub mod response_cache;
pub mod semantic_cache;

pub use response_cache::{CacheKey, ResponseCache, ResponseCacheStats};
pub use semantic_cache::{EntryOutcomes, SemanticCache, SemanticCacheStats, SemanticHit};
