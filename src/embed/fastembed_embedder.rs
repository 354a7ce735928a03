//! FastEmbed-backed ONNX embedder.
//!
//! Wraps a `fastembed::TextEmbedding` session. The first construction
//! downloads model files into the cache directory when they are not already
//! present, which is why callers reach this only through the lazily-loading
//! model manager. Inference on a loaded session is read-only and safe to
//! run concurrently.

use std::path::PathBuf;

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use parking_lot::Mutex;
use tracing::{debug, info};

use super::embedder::{Embedder, EmbedderError, EmbedderResult};

/// Probe string for dimension verification at load time.
const DIM_PROBE: &str = "hello";

pub struct FastEmbedder {
    id: String,
    dimension: usize,
    max_input_chars: usize,
    model: Mutex<TextEmbedding>,
}

impl FastEmbedder {
    /// Load the given model, verifying the declared dimension against a
    /// probe encode. `declared_dim` is what backend introspection reports
    /// for the model; the probe path must agree with it.
    pub fn load(
        id: &str,
        model: EmbeddingModel,
        declared_dim: usize,
        cache_dir: Option<PathBuf>,
        max_input_chars: usize,
    ) -> EmbedderResult<Self> {
        let mut opts = InitOptions::new(model).with_show_download_progress(false);
        if let Some(dir) = cache_dir {
            opts = opts.with_cache_dir(dir);
        }

        let mut model = TextEmbedding::try_new(opts)
            .map_err(|e| EmbedderError::Unavailable(format!("loading {id}: {e}")))?;

        // Introspected and probed dimensions must agree; a mismatch means
        // the registry entry is wrong for the files on disk.
        let probe = model
            .embed(vec![DIM_PROBE], None)
            .map_err(|e| EmbedderError::Unavailable(format!("probe encode for {id}: {e}")))?;
        let probed_dim = probe
            .first()
            .map(Vec::len)
            .ok_or_else(|| EmbedderError::Unavailable(format!("probe encode for {id}: empty")))?;
        if probed_dim != declared_dim {
            return Err(EmbedderError::Unavailable(format!(
                "{id}: declared dimension {declared_dim} but probe returned {probed_dim}"
            )));
        }

        info!(embedder = id, dimension = probed_dim, "loaded embedding model");
        Ok(Self {
            id: id.to_string(),
            dimension: probed_dim,
            max_input_chars,
            model: Mutex::new(model),
        })
    }

    /// Truncate to the configured input bound on a char boundary.
    fn clip<'a>(&self, text: &'a str) -> &'a str {
        if text.chars().count() <= self.max_input_chars {
            return text;
        }
        let end = text
            .char_indices()
            .nth(self.max_input_chars)
            .map_or(text.len(), |(i, _)| i);
        debug!(
            chars = self.max_input_chars,
            "truncating transcript before encoding"
        );
        &text[..end]
    }
}

impl Embedder for FastEmbedder {
    fn id(&self) -> &str {
        &self.id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, texts: &[String]) -> EmbedderResult<Vec<Vec<f32>>> {
        let clipped: Vec<&str> = texts.iter().map(|t| self.clip(t)).collect();
        self.model
            .lock()
            .embed(clipped, None)
            .map_err(|e| EmbedderError::Inference(e.to_string()))
    }

    fn is_semantic(&self) -> bool {
        true
    }
}
