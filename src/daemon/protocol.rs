//! Wire protocol for the vidsim daemon.
//!
//! Requests and responses travel over a Unix Domain Socket as
//! length-prefixed MessagePack frames: a 4-byte big-endian payload
//! length followed by the serialized `FramedMessage`.

use serde::{Deserialize, Serialize};

use crate::ingest::IngestRequest;
use crate::similar::SimilarHit;

/// Protocol version for compatibility checks.
pub const PROTOCOL_VERSION: u32 = 1;

/// Frames larger than this are rejected without reading the payload.
pub const MAX_FRAME_BYTES: usize = 32 * 1024 * 1024;

/// Neighbor count when a similarity request omits `k`.
pub const DEFAULT_K: usize = 20;

fn default_k() -> usize {
    DEFAULT_K
}

/// Request types for the daemon protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    /// Embed a transcript and store it with its metadata.
    Ingest(IngestRequest),

    /// Nearest neighbors of a stored video.
    Similar {
        seed_id: String,
        #[serde(default = "default_k")]
        k: usize,
    },

    /// Liveness check; never touches the model.
    Health,

    /// Model identity and dimension; forces the model resident.
    ModelInfo,

    /// Force the embedding model resident.
    Warmup,

    /// Request graceful shutdown.
    Shutdown,
}

/// Response types from the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    Ingest { video_id: String },
    Similar { hits: Vec<SimilarHit> },
    Health(HealthStatus),
    ModelInfo(ModelStatus),
    Warmup(ModelStatus),
    Shutdown { message: String },
    Error(ErrorResponse),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub uptime_secs: u64,
    pub version: u32,
    /// Configured model name, answered from the registry without a load.
    pub model: String,
    /// Whether the embedding model is resident. False is still healthy.
    pub model_loaded: bool,
    /// Whether the database path came from explicit configuration.
    pub db_configured: bool,
    pub videos: i64,
    pub embeddings: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelStatus {
    pub name: String,
    pub dimension: Option<usize>,
    pub loaded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    /// Unknown or internal error.
    Internal,
    /// Invalid request parameters.
    InvalidInput,
    /// Embedding model failed to load or infer.
    ModelUnavailable,
    /// Stored index width disagrees with the active model.
    DimensionMismatch,
}

/// Framed message wrapper for the length-prefixed protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FramedMessage<T> {
    pub version: u32,
    /// Request ID for correlation.
    pub request_id: String,
    pub payload: T,
}

impl<T> FramedMessage<T> {
    pub fn new(request_id: impl Into<String>, payload: T) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            request_id: request_id.into(),
            payload,
        }
    }
}

/// Encode a message to MessagePack bytes with length prefix.
pub fn encode_message<T: Serialize>(msg: &FramedMessage<T>) -> Result<Vec<u8>, CodecError> {
    let payload = rmp_serde::to_vec(msg).map_err(|e| CodecError(e.to_string()))?;
    let len = payload.len() as u32;
    let mut buf = Vec::with_capacity(4 + payload.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Decode a message from MessagePack bytes (without length prefix).
pub fn decode_message<T: for<'de> Deserialize<'de>>(
    data: &[u8],
) -> Result<FramedMessage<T>, CodecError> {
    rmp_serde::from_slice(data).map_err(|e| CodecError(e.to_string()))
}

#[derive(Debug, Clone)]
pub struct CodecError(pub String);

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "frame codec error: {}", self.0)
    }
}

impl std::error::Error for CodecError {}
