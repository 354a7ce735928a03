//! Lazily-initialized embedding model manager.
//!
//! One `ModelManager` is constructed per process and injected into the
//! ingest pipeline and the daemon handlers; it is the only piece of shared
//! mutable state in the crate. Construction is cheap (no I/O). The backend
//! is loaded on the first call that needs it (`dimension`, `encode`,
//! `warmup`), guarded by a mutex so racing first callers block until a
//! single load completes. A failed load is **not** cached: the slot stays
//! empty and the next call retries from scratch, so transient failures
//! self-heal.
//!
//! After initialization `encode` takes only a shared read lock to clone the
//! `Arc` handle out, so readers never contend with each other; the write
//! lock is held only while loading. When `VIDSIM_SERIAL_ENCODE` is set, all
//! inference additionally routes through a dedicated mutex for backends
//! that are unsafe to run concurrently.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tracing::info;

use super::embedder::{Embedder, EmbedderResult};
use super::registry::{self, RegisteredModel};
use crate::config::Config;
use crate::error::{Result, ServiceError};

/// Unit-norm tolerance for encoded vectors.
pub const NORM_TOLERANCE: f32 = 1e-4;

type LoadFn =
    Box<dyn Fn(&'static RegisteredModel, &Config) -> EmbedderResult<Arc<dyn Embedder>> + Send + Sync>;

pub struct ModelManager {
    config: Config,
    model: &'static RegisteredModel,
    handle: RwLock<Option<Arc<dyn Embedder>>>,
    loader: LoadFn,
    /// Present only when encode calls must be serialized.
    encode_gate: Option<Mutex<()>>,
}

impl ModelManager {
    /// Validate the configured model name and build an unloaded manager.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_loader(config, Box::new(|model, config| registry::load(model, config)))
    }

    fn with_loader(config: Config, loader: LoadFn) -> Result<Self> {
        let model = registry::lookup(&config.model_name)
            .map_err(|e| ServiceError::ModelLoad(e.to_string()))?;
        let encode_gate = config.serial_encode.then(|| Mutex::new(()));
        Ok(Self {
            config,
            model,
            handle: RwLock::new(None),
            loader,
            encode_gate,
        })
    }

    /// Configured model identifier. Never forces a load, so health
    /// reporting can name the model before first use.
    pub fn name(&self) -> &str {
        self.model.name
    }

    /// Whether the backend has been loaded yet.
    pub fn is_loaded(&self) -> bool {
        self.handle.read().is_some()
    }

    /// Whether the configured model is semantic rather than the lexical
    /// hash fallback. Answered from the registry, never forces a load.
    pub fn is_semantic(&self) -> bool {
        self.model.is_semantic
    }

    /// Output dimension. Forces initialization.
    pub fn dimension(&self) -> Result<usize> {
        Ok(self.get_or_load()?.dimension())
    }

    /// Force initialization for its side effect only.
    pub fn warmup(&self) -> Result<()> {
        self.get_or_load().map(|_| ())
    }

    /// Encode one text into an L2-normalized vector. Forces initialization
    /// on first use, which is an observable latency spike, not an error.
    pub fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let embedder = self.get_or_load()?;

        let mut vectors = {
            let _serial = self.encode_gate.as_ref().map(|g| g.lock());
            embedder
                .embed(std::slice::from_ref(&text.to_string()))
                .map_err(|e| ServiceError::ModelLoad(e.to_string()))?
        };

        let mut v = vectors
            .pop()
            .ok_or_else(|| ServiceError::ModelLoad("backend returned no vector".into()))?;
        if v.len() != embedder.dimension() {
            return Err(ServiceError::DimensionMismatch {
                stored: v.len(),
                model: embedder.dimension(),
            });
        }
        normalize(&mut v)?;
        Ok(v)
    }

    /// Load-once accessor. Exactly one initialization occurs even under
    /// racing callers; an error leaves the slot empty for retry. The fast
    /// path after initialization is a shared read lock.
    fn get_or_load(&self) -> Result<Arc<dyn Embedder>> {
        if let Some(handle) = self.handle.read().as_ref() {
            return Ok(Arc::clone(handle));
        }

        let mut guard = self.handle.write();
        // A racing caller may have loaded while we waited for the lock.
        if let Some(handle) = guard.as_ref() {
            return Ok(Arc::clone(handle));
        }

        let start = Instant::now();
        let handle = (self.loader)(self.model, &self.config)
            .map_err(|e| ServiceError::ModelLoad(e.to_string()))?;
        info!(
            model = self.model.name,
            dimension = handle.dimension(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "initialized embedding model"
        );
        *guard = Some(Arc::clone(&handle));
        Ok(handle)
    }
}

/// Scale to unit length. A zero vector cannot be normalized; it only
/// arises from input with no usable tokens, which is an input fault.
fn normalize(v: &mut [f32]) -> Result<()> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        return Err(ServiceError::InvalidInput(
            "text produced a zero embedding".into(),
        ));
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
    Ok(())
}
