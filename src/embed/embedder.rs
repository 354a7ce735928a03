//! Embedder trait: the seam between the model manager and concrete backends.

use thiserror::Error;

/// Result type for embedder operations.
pub type EmbedderResult<T> = std::result::Result<T, EmbedderError>;

#[derive(Debug, Error)]
pub enum EmbedderError {
    /// Model files missing, load failed, or the backend is not usable.
    #[error("embedder unavailable: {0}")]
    Unavailable(String),

    /// Inference failed on an otherwise-loaded model.
    #[error("inference failed: {0}")]
    Inference(String),
}

/// A text-embedding backend.
///
/// Implementations must be safe to call from multiple threads; backends
/// whose inference is not reentrant are serialized one level up by the
/// model manager (`VIDSIM_SERIAL_ENCODE`).
pub trait Embedder: Send + Sync {
    /// Stable identifier, e.g. `bge-small-en-v1.5` or `fnv1a-384`.
    fn id(&self) -> &str;

    /// Output dimension reported by backend introspection.
    fn dimension(&self) -> usize;

    /// Embed a batch of texts. Returns one vector per input, each of
    /// [`dimension`](Embedder::dimension) components. Vectors are not
    /// guaranteed unit-norm here; the model manager normalizes.
    fn embed(&self, texts: &[String]) -> EmbedderResult<Vec<Vec<f32>>>;

    /// Whether this backend produces semantic (ML) embeddings, as opposed
    /// to the lexical hash fallback.
    fn is_semantic(&self) -> bool;
}
