//! Embedding layer: backends, registry, and the lazy model manager.
//!
//! - [`embedder`]: the `Embedder` trait boundary.
//! - [`hash_embedder`]: FNV-1a feature hashing (deterministic fallback).
//! - [`fastembed_embedder`]: FastEmbed-backed ONNX models.
//! - [`registry`]: configured-name to backend mapping.
//! - [`model_manager`]: process-wide lazy loading and normalization.

pub mod embedder;
pub mod fastembed_embedder;
pub mod hash_embedder;
pub mod model_manager;
pub mod registry;

pub use embedder::{Embedder, EmbedderError};
pub use model_manager::ModelManager;
