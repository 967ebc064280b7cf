//! Offline embedder for tests in this and dependent crates.

use crate::embeddings::Embeddings;
use async_trait::async_trait;
use ragchat_common::Result;

/// Deterministic bag-of-words embedder. Texts sharing words get similar vectors.
#[derive(Debug, Clone)]
pub struct BagOfWordsEmbeddings {
    dimension: usize,
}

impl BagOfWordsEmbeddings {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for BagOfWordsEmbeddings {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl Embeddings for BagOfWordsEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0; self.dimension];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let slot = fnv1a(&word.to_lowercase()) as usize % self.dimension;
            vector[slot] += 1.0;
        }
        Ok(vector)
    }
}

fn fnv1a(word: &str) -> u64 {
    word.bytes().fold(0xcbf29ce484222325, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(0x100000001b3)
    })
}
