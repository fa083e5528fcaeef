//! Text embedders.
//!
//! [`NgramEmbedder`] needs no model: it hashes word unigrams, word bigrams
//! and character trigrams into a fixed number of buckets (feature hashing),
//! weights them, and normalizes the result to unit length. Paraphrases
//! that share content words and word stems land close together; unrelated
//! goals land near zero.

use super::vector::EmbeddingVector;

/// Turns request text into a fixed-length vector.
pub trait TextEmbedder: Send + Sync {
    fn embed(&self, text: &str) -> EmbeddingVector;

    /// Length of every vector this embedder returns.
    fn dimension(&self) -> usize;
}

const DEFAULT_DIMENSION: usize = 256;
const MIN_TERM_LEN: usize = 3;

const WORD_WEIGHT: f32 = 1.0;
const BIGRAM_WEIGHT: f32 = 0.5;
const TRIGRAM_WEIGHT: f32 = 0.25;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "into", "onto", "then", "please", "some",
    "our", "your", "you", "can", "could", "would", "will", "just", "near", "over",
];

/// Hashed n-gram embedder.
#[derive(Debug, Clone)]
pub struct NgramEmbedder {
    dimension: usize,
}

impl Default for NgramEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

impl NgramEmbedder {
    /// `dimension` is clamped to at least 1.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn bucket(&self, feature: &str) -> usize {
        (fnv1a(feature.as_bytes()) % self.dimension as u64) as usize
    }
}

impl TextEmbedder for NgramEmbedder {
    fn embed(&self, text: &str) -> EmbeddingVector {
        let mut values = vec![0.0f32; self.dimension];
        let terms = content_terms(text);

        for term in &terms {
            values[self.bucket(&format!("w:{term}"))] += WORD_WEIGHT;

            let padded: Vec<char> = format!(" {term} ").chars().collect();
            for window in padded.windows(3) {
                let trigram: String = window.iter().collect();
                values[self.bucket(&format!("c:{trigram}"))] += TRIGRAM_WEIGHT;
            }
        }

        for pair in terms.windows(2) {
            values[self.bucket(&format!("b:{} {}", pair[0], pair[1]))] += BIGRAM_WEIGHT;
        }

        EmbeddingVector::new(values).normalized()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Lowercased words of at least three characters, stopwords removed.
fn content_terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= MIN_TERM_LEN)
        .map(str::to_lowercase)
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// 64-bit FNV-1a; stable across runs and platforms.
fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, b| (hash ^ u64::from(*b)).wrapping_mul(PRIME))
}
