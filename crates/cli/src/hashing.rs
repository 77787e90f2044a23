//! Demo embedder served by `embedplug serve`.
//!
//! Feature hashing over lowercase alphanumeric tokens: each token adds ±1 to
//! one bucket chosen by its FNV-1a hash, and the result is L2-normalised. The
//! output depends only on the input text and the dimension count, so a host
//! can compare bridged results against a local instance.

use std::num::NonZeroUsize;

use async_trait::async_trait;

use embedding::{Embedding, EmbeddingError};
use plugin_core::CallContext;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    dimensions: NonZeroUsize,
}

impl HashingEmbedder {
    /// Creates an embedder producing `dimensions`-long vectors.
    pub fn new(dimensions: NonZeroUsize) -> Self {
        Self { dimensions }
    }

    /// Length of every produced vector.
    pub fn dimensions(&self) -> usize {
        self.dimensions.get()
    }

    fn compute(&self, input: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimensions()];

        for token in input
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
        {
            let hash = fnv1a(&token.to_lowercase());
            let bucket = (hash % self.dimensions() as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

#[async_trait]
impl Embedding for HashingEmbedder {
    /// Never fails. The computation is synchronous and short, so cancellation
    /// is left to the caller's side of the call.
    async fn embed(&self, _ctx: &CallContext, input: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.compute(input))
    }
}

fn fnv1a(token: &str) -> u64 {
    token.bytes().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedder(dimensions: usize) -> HashingEmbedder {
        HashingEmbedder::new(NonZeroUsize::new(dimensions).unwrap())
    }

    #[tokio::test]
    async fn output_is_deterministic_and_sized() {
        let embedder = embedder(16);
        let ctx = CallContext::new();

        let first = embedder.embed(&ctx, "The quick brown fox").await.unwrap();
        let second = embedder.embed(&ctx, "The quick brown fox").await.unwrap();

        assert_eq!(first.len(), 16);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn tokens_are_case_and_punctuation_insensitive() {
        let embedder = embedder(32);
        let ctx = CallContext::new();

        let plain = embedder.embed(&ctx, "hello world").await.unwrap();
        let noisy = embedder.embed(&ctx, "  HELLO, World!").await.unwrap();
        assert_eq!(plain, noisy);
    }

    #[tokio::test]
    async fn non_empty_output_has_unit_length() {
        let vector = embedder(8).embed(&CallContext::new(), "a b c d e").await.unwrap();
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5, "norm was {norm}");
    }

    #[tokio::test]
    async fn empty_input_yields_the_zero_vector() {
        let vector = embedder(4).embed(&CallContext::new(), "").await.unwrap();
        assert_eq!(vector, vec![0.0; 4]);
    }

    #[tokio::test]
    async fn cancellation_is_not_reported_as_a_computation_failure() {
        let ctx = CallContext::new();
        ctx.cancel();
        let vector = embedder(4).embed(&ctx, "hello").await.unwrap();
        assert_eq!(vector, embedder(4).embed(&CallContext::new(), "hello").await.unwrap());
    }

    #[test]
    fn fnv1a_matches_reference_values() {
        assert_eq!(fnv1a(""), FNV_OFFSET);
        assert_eq!(fnv1a("a"), 0xaf63_dc4c_8601_ec8c);
    }
}
