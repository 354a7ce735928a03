//! Similarity queries over the stored embedding index.
//!
//! Queries run entirely against stored vectors; the embedding model is
//! never consulted, so lookups stay fast even before warmup. A missing
//! seed is an empty result set, not an error.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codec;
use crate::config::Config;
use crate::error::Result;
use crate::storage::SqliteStorage;

/// One neighbor of the seed, most similar first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarHit {
    pub video_id: String,
    #[serde(default)]
    pub title: Option<String>,
    /// 1 − cosine distance, in [-1, 1]; 1.0 is an identical direction.
    pub sim: f64,
}

pub struct SimilarityQueryEngine {
    config: Config,
}

impl SimilarityQueryEngine {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Query against a fresh short-lived storage connection.
    pub fn similar(&self, seed_id: &str, k: usize) -> Result<Vec<SimilarHit>> {
        let storage = SqliteStorage::open(&self.config.db_path)?;
        self.similar_with(&storage, seed_id, k)
    }

    /// Query against a caller-provided storage handle.
    pub fn similar_with(
        &self,
        storage: &SqliteStorage,
        seed_id: &str,
        k: usize,
    ) -> Result<Vec<SimilarHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let Some(stored) = storage.seed_embedding(seed_id)? else {
            debug!(seed_id, "seed has no stored embedding");
            return Ok(Vec::new());
        };
        let seed_vector = stored.resolve()?;

        // Overfetch so that dropping the seed itself still leaves k hits.
        // k arrives over the wire, so the sum must not be trusted to fit.
        let fetch = k.saturating_add(self.config.overfetch_margin);
        let neighbors = storage.nearest(&codec::encode(&seed_vector), fetch)?;

        let hits: Vec<SimilarHit> = neighbors
            .into_iter()
            .filter(|n| n.video_id != seed_id)
            .take(k)
            .map(|n| SimilarHit {
                video_id: n.video_id,
                title: n.title,
                sim: 1.0 - n.distance,
            })
            .collect();
        debug!(seed_id, k, hits = hits.len(), "similarity query");
        Ok(hits)
    }
}
