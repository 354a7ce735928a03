//! Registry of supported embedding models.
//!
//! Maps configured model names to backends. The registry answers identity
//! questions (name, dimension) without loading anything, which is what lets
//! health reporting stay cheap; actual loading happens in the model manager.

use std::sync::Arc;

use fastembed::EmbeddingModel;

use super::embedder::{Embedder, EmbedderError, EmbedderResult};
use super::fastembed_embedder::FastEmbedder;
use super::hash_embedder::HashEmbedder;
use crate::config::Config;

/// Default model when none is configured. Matches the service this replaced.
pub const DEFAULT_MODEL: &str = "bge-small-en-v1.5";

/// A registered embedding model.
#[derive(Debug, Clone, Copy)]
pub struct RegisteredModel {
    /// Name accepted in configuration (e.g. `bge-small-en-v1.5`).
    pub name: &'static str,
    /// Stable embedder id.
    pub id: &'static str,
    /// Output dimension per backend introspection.
    pub dimension: usize,
    /// Whether this is a semantic (ML) model.
    pub is_semantic: bool,
}

pub static MODELS: &[RegisteredModel] = &[
    RegisteredModel {
        name: "bge-small-en-v1.5",
        id: "bge-small-en-v1.5",
        dimension: 384,
        is_semantic: true,
    },
    RegisteredModel {
        name: "minilm",
        id: "minilm-384",
        dimension: 384,
        is_semantic: true,
    },
    RegisteredModel {
        name: "hash",
        id: "fnv1a-384",
        dimension: 384,
        is_semantic: false,
    },
];

/// Look up a registered model by configured name.
pub fn lookup(name: &str) -> EmbedderResult<&'static RegisteredModel> {
    let lowered = name.to_ascii_lowercase();
    MODELS
        .iter()
        .find(|m| m.name == lowered || m.id == lowered)
        .ok_or_else(|| {
            EmbedderError::Unavailable(format!(
                "unknown embedding model '{}'. Available: {}",
                name,
                MODELS
                    .iter()
                    .map(|m| m.name)
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })
}

/// Construct (load) the backend for a registered model.
pub fn load(model: &RegisteredModel, config: &Config) -> EmbedderResult<Arc<dyn Embedder>> {
    match model.name {
        "hash" => Ok(Arc::new(HashEmbedder::new())),
        "bge-small-en-v1.5" => Ok(Arc::new(FastEmbedder::load(
            model.id,
            EmbeddingModel::BGESmallENV15,
            model.dimension,
            config.model_cache_dir.clone(),
            config.max_input_chars,
        )?)),
        "minilm" => Ok(Arc::new(FastEmbedder::load(
            model.id,
            EmbeddingModel::AllMiniLML6V2,
            model.dimension,
            config.model_cache_dir.clone(),
            config.max_input_chars,
        )?)),
        other => Err(EmbedderError::Unavailable(format!(
            "model '{other}' not implemented"
        ))),
    }
}
