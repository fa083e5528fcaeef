//! Text embeddings for the semantic plan cache.
//!
//! - [`EmbeddingVector`] - fixed-length vector with cosine similarity
//! - [`TextEmbedder`] - turns request text into a vector
//! - [`NgramEmbedder`] - dependency-free hashed n-gram embedder

pub mod embedder;
pub mod vector;

pub use embedder::{NgramEmbedder, TextEmbedder};
pub use vector::EmbeddingVector;
