//! FNV-1a feature-hashing embedder.
//!
//! Deterministic lexical fallback: always available, no model files, no
//! network. Tokens are lowercased alphanumeric runs; each token hashes to a
//! bucket and the bucket counts are L2-normalized downstream. Shared tokens
//! between two texts translate directly into cosine similarity, which is
//! enough for offline tests and degraded operation, not a substitute for a
//! semantic model.

use super::embedder::{Embedder, EmbedderResult};

/// Output dimension, matching the default semantic models so the stored
/// schema does not change when switching between them in a fresh database.
pub const HASH_DIM: usize = 384;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut h = FNV_OFFSET;
    for b in bytes {
        h ^= u64::from(*b);
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

#[derive(Debug, Default)]
pub struct HashEmbedder {
    _priv: (),
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0_f32; HASH_DIM];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let lowered = token.to_lowercase();
            let h = fnv1a(lowered.as_bytes());
            let bucket = (h % HASH_DIM as u64) as usize;
            // Sign bit from a higher hash bit reduces collision bias.
            let sign = if h & (1 << 63) == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        v
    }
}

impl Embedder for HashEmbedder {
    fn id(&self) -> &str {
        "fnv1a-384"
    }

    fn dimension(&self) -> usize {
        HASH_DIM
    }

    fn embed(&self, texts: &[String]) -> EmbedderResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn is_semantic(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let e = HashEmbedder::new();
        let a = e.embed(&["hello world".into()]).unwrap();
        let b = e.embed(&["hello world".into()]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn dimension_matches_output() {
        let e = HashEmbedder::new();
        let out = e.embed(&["probe".into()]).unwrap();
        assert_eq!(out[0].len(), e.dimension());
    }

    #[test]
    fn case_insensitive_tokens() {
        let e = HashEmbedder::new();
        let a = &e.embed(&["The Cat".into()]).unwrap()[0];
        let b = &e.embed(&["the cat".into()]).unwrap()[0];
        assert_eq!(a, b);
    }

    #[test]
    fn shared_tokens_raise_dot_product() {
        let e = HashEmbedder::new();
        let near = &e.embed(&["a cat sat on a mat".into()]).unwrap()[0];
        let seed = &e.embed(&["the cat sat on the mat".into()]).unwrap()[0];
        let far = &e.embed(&["quantum chromodynamics lecture".into()]).unwrap()[0];
        let dot = |x: &[f32], y: &[f32]| -> f32 { x.iter().zip(y).map(|(a, b)| a * b).sum() };
        assert!(dot(seed, near) > dot(seed, far));
    }
}
