//! # Embedder (C3)
//!
//! `Embedder` is the explicit interface the design notes call for
//! (capability set `{Encode}`), replacing a concrete embedder struct with a
//! trait two implementations can satisfy: [`candle_embedder::CandleEmbedder`]
//! (a real BERT encoder, same stack as the source material) and
//! [`hashing_embedder::HashingEmbedder`] (a deterministic, model-free
//! fallback used by the test suite).

pub mod candle_embedder;
pub mod hashing_embedder;

use crate::error::EmbedError;

pub use candle_embedder::CandleEmbedder;
pub use hashing_embedder::HashingEmbedder;

/// Asymmetric bi-encoder prefixes. The source material's embedder encodes
/// queries and documents identically with no prefix; this crate adds the
/// "search_query:"/"search_document:" convention used by asymmetric
/// retrieval-tuned encoders (e.g. the `e5`/`bge` model families), so a
/// query and the passage that answers it land differently in embedding
/// space even when the text overlaps heavily.
pub const QUERY_PREFIX: &str = "search_query: ";
pub const DOCUMENT_PREFIX: &str = "search_document: ";

/// Deterministic batch encoder into fixed-dimension, L2-normalized vectors.
///
/// Implementations must guarantee that `encode` is independent of how the
/// input is batched: `encode(&[a, b])[0] == encode(&[a])[0]`.
pub trait Embedder: Send + Sync {
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;

    /// Fixed output dimension, `D` in spec.md §4.3.
    fn dim(&self) -> usize;

    fn encode_document(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let prefixed: Vec<String> = texts.iter().map(|t| format!("{DOCUMENT_PREFIX}{t}")).collect();
        self.encode(&prefixed)
    }

    fn encode_query(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let prefixed = format!("{QUERY_PREFIX}{text}");
        Ok(self
            .encode(&[prefixed])?
            .into_iter()
            .next()
            .expect("encoder must return one vector per input text"))
    }
}

/// L2-normalize a vector in place; returns it unchanged if its norm is ~0.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-12 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity between two equal-length vectors; `0.0` for mismatched
/// lengths, empty vectors, or zero-norm vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a <= 1e-12 || norm_b <= 1e-12 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let v = vec![0.3, 0.4, 0.5];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-5);
    }

    #[test]
    fn cosine_similarity_mismatched_lengths_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn l2_normalize_produces_unit_norm() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }
}
