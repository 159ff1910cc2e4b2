//! Deterministic, model-free embedder used by tests and as a degraded-mode
//! fallback. Feature-hashes whitespace tokens into a fixed-width vector and
//! L2-normalizes it, satisfying the same contract as [`super::Embedder`]
//! (deterministic, batch-independent) without downloading model weights.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::error::EmbedError;

use super::{l2_normalize, Embedder};

pub struct HashingEmbedder {
    dim: usize,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    fn hash_token(token: &str, dim: usize) -> usize {
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        (hasher.finish() as usize) % dim
    }

    fn encode_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for token in text.split_whitespace() {
            let lower = token.to_lowercase();
            let idx = Self::hash_token(&lower, self.dim);
            v[idx] += 1.0;
            // A second, differently-salted hash spreads signal across more
            // dimensions so near-duplicate texts aren't solely distinguished
            // by hash collisions on a single slot.
            let idx2 = Self::hash_token(&format!("{lower}#2"), self.dim);
            v[idx2] += 0.5;
        }
        l2_normalize(&mut v);
        v
    }
}

impl Embedder for HashingEmbedder {
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|t| self.encode_one(t)).collect())
    }

    fn dim(&self) -> usize {
        self.dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_across_calls() {
        let e = HashingEmbedder::new(384);
        let a = e.encode(&["an fx forward contract".to_string()]).unwrap();
        let b = e.encode(&["an fx forward contract".to_string()]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn batch_independent() {
        let e = HashingEmbedder::new(384);
        let solo = e.encode(&["hello world".to_string()]).unwrap();
        let batched = e
            .encode(&["something else".to_string(), "hello world".to_string()])
            .unwrap();
        assert_eq!(solo[0], batched[1]);
    }

    #[test]
    fn output_is_l2_normalized() {
        let e = HashingEmbedder::new(64);
        let v = e.encode(&["some text to embed".to_string()]).unwrap();
        let norm: f32 = v[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4 || norm == 0.0);
    }

    #[test]
    fn fixed_dimension() {
        let e = HashingEmbedder::new(128);
        let v = e.encode(&["x".to_string(), "y y y".to_string()]).unwrap();
        assert_eq!(v[0].len(), 128);
        assert_eq!(v[1].len(), 128);
    }
}
