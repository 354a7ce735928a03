//! Daemon server core.
//!
//! Listens on a Unix Domain Socket and serves ingest and similarity
//! requests with the embedding model held warm across connections. The
//! model itself still loads lazily: the first ingest (or an explicit
//! Warmup) pays the load cost, health checks never do.

use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use super::protocol::{
    ErrorCode, ErrorResponse, FramedMessage, HealthStatus, MAX_FRAME_BYTES, ModelStatus,
    PROTOCOL_VERSION, Request, Response, decode_message, encode_message,
};
use crate::config::Config;
use crate::embed::ModelManager;
use crate::error::{Result, ServiceError};
use crate::ingest::IngestPipeline;
use crate::similar::SimilarityQueryEngine;
use crate::storage::SqliteStorage;

/// Configuration for the daemon server.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Path to the Unix socket.
    pub socket_path: PathBuf,
    /// Per-connection read/write timeout.
    pub request_timeout: Duration,
    /// Idle shutdown timeout (0 = never shutdown).
    pub idle_timeout: Duration,
}

impl DaemonConfig {
    /// Socket path from the service config, timeouts from the environment.
    pub fn from_env(config: &Config) -> Self {
        let mut cfg = Self {
            socket_path: config.socket_path.clone(),
            request_timeout: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(0),
        };

        if let Ok(val) = dotenvy::var("VIDSIM_DAEMON_REQUEST_TIMEOUT_SECS")
            && let Ok(secs) = val.parse()
        {
            cfg.request_timeout = Duration::from_secs(secs);
        }

        if let Ok(val) = dotenvy::var("VIDSIM_DAEMON_IDLE_TIMEOUT_SECS")
            && let Ok(secs) = val.parse()
        {
            cfg.idle_timeout = Duration::from_secs(secs);
        }

        cfg
    }
}

/// Daemon server state.
pub struct VidsimDaemon {
    daemon_config: DaemonConfig,
    config: Config,
    models: Arc<ModelManager>,
    pipeline: IngestPipeline,
    engine: SimilarityQueryEngine,
    start_time: Instant,
    total_requests: AtomicU64,
    shutdown: AtomicBool,
    last_activity: RwLock<Instant>,
}

impl VidsimDaemon {
    pub fn new(daemon_config: DaemonConfig, config: Config) -> Result<Self> {
        let models = Arc::new(ModelManager::new(config.clone())?);
        let pipeline = IngestPipeline::new(config.clone(), Arc::clone(&models));
        let engine = SimilarityQueryEngine::new(config.clone());
        Ok(Self {
            daemon_config,
            config,
            models,
            pipeline,
            engine,
            start_time: Instant::now(),
            total_requests: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
            last_activity: RwLock::new(Instant::now()),
        })
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Request the daemon to shutdown.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    fn should_shutdown_idle(&self) -> bool {
        if self.daemon_config.idle_timeout.is_zero() {
            return false;
        }
        let last = *self.last_activity.read();
        last.elapsed() > self.daemon_config.idle_timeout
    }

    fn touch_activity(&self) {
        *self.last_activity.write() = Instant::now();
    }

    /// Start the daemon server. Blocks until shutdown; each accepted
    /// connection is served on its own thread.
    pub fn run(self: &Arc<Self>) -> std::io::Result<()> {
        // Remove stale socket if exists
        if self.daemon_config.socket_path.exists() {
            std::fs::remove_file(&self.daemon_config.socket_path)?;
        }
        if let Some(parent) = self.daemon_config.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&self.daemon_config.socket_path)?;
        listener.set_nonblocking(true)?;

        info!(
            socket = %self.daemon_config.socket_path.display(),
            model = self.models.name(),
            db = %self.config.db_path.display(),
            "daemon listening"
        );

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                info!("shutdown requested, stopping daemon");
                break;
            }
            if self.should_shutdown_idle() {
                info!(
                    idle_secs = self.daemon_config.idle_timeout.as_secs(),
                    "idle timeout reached, shutting down"
                );
                break;
            }

            match listener.accept() {
                Ok((stream, _addr)) => {
                    self.touch_activity();
                    let daemon = Arc::clone(self);
                    std::thread::spawn(move || {
                        if let Err(e) = daemon.handle_connection(stream) {
                            debug!(error = %e, "connection error");
                        }
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(10));
                }
                Err(e) => {
                    error!(error = %e, "accept error");
                    std::thread::sleep(Duration::from_millis(100));
                }
            }
        }

        if self.daemon_config.socket_path.exists() {
            let _ = std::fs::remove_file(&self.daemon_config.socket_path);
        }
        info!("daemon stopped");
        Ok(())
    }

    /// Handle a single client connection.
    fn handle_connection(&self, mut stream: UnixStream) -> std::io::Result<()> {
        stream.set_read_timeout(Some(self.daemon_config.request_timeout))?;
        stream.set_write_timeout(Some(self.daemon_config.request_timeout))?;

        loop {
            let mut len_buf = [0u8; 4];
            match stream.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    debug!("client disconnected");
                    return Ok(());
                }
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                    debug!("connection timed out");
                    return Ok(());
                }
                Err(e) => return Err(e),
            }

            let len = u32::from_be_bytes(len_buf) as usize;
            if len > MAX_FRAME_BYTES {
                warn!(len, "request frame too large, closing connection");
                return Ok(());
            }

            let mut payload = vec![0u8; len];
            stream.read_exact(&mut payload)?;

            let response = match decode_message::<Request>(&payload) {
                Ok(msg) => {
                    self.total_requests.fetch_add(1, Ordering::Relaxed);
                    self.touch_activity();
                    let response = self.handle_request(&msg.request_id, msg.payload);
                    FramedMessage::new(msg.request_id, response)
                }
                Err(e) => {
                    warn!(error = %e, "failed to decode request");
                    FramedMessage::new(
                        "error",
                        Response::Error(ErrorResponse {
                            code: ErrorCode::InvalidInput,
                            message: format!("decode error: {}", e),
                        }),
                    )
                }
            };

            let encoded =
                encode_message(&response).map_err(|e| std::io::Error::other(e.to_string()))?;
            stream.write_all(&encoded)?;

            if matches!(response.payload, Response::Shutdown { .. }) {
                return Ok(());
            }
        }
    }

    fn handle_request(&self, request_id: &str, request: Request) -> Response {
        match request {
            Request::Ingest(req) => {
                debug!(request_id, video_id = %req.video_id, "processing ingest request");
                match self.pipeline.ingest(&req) {
                    Ok(()) => Response::Ingest {
                        video_id: req.video_id,
                    },
                    Err(e) => error_response(e),
                }
            }

            Request::Similar { seed_id, k } => {
                debug!(request_id, %seed_id, k, "processing similarity request");
                match self.engine.similar(&seed_id, k) {
                    Ok(hits) => Response::Similar { hits },
                    Err(e) => error_response(e),
                }
            }

            Request::Health => {
                let (videos, embeddings) = self.storage_counts();
                Response::Health(HealthStatus {
                    uptime_secs: self.uptime_secs(),
                    version: PROTOCOL_VERSION,
                    model: self.models.name().to_string(),
                    model_loaded: self.models.is_loaded(),
                    db_configured: self.config.db_configured,
                    videos,
                    embeddings,
                })
            }

            // Unlike Health, ModelInfo proves the model actually works.
            Request::ModelInfo => match self.models.warmup() {
                Ok(()) => Response::ModelInfo(self.model_status()),
                Err(e) => error_response(e),
            },

            Request::Warmup => match self.models.warmup() {
                Ok(()) => Response::Warmup(self.model_status()),
                Err(e) => error_response(e),
            },

            Request::Shutdown => {
                info!(request_id, "shutdown requested");
                self.shutdown.store(true, Ordering::SeqCst);
                Response::Shutdown {
                    message: "daemon shutting down".to_string(),
                }
            }
        }
    }

    fn model_status(&self) -> ModelStatus {
        let loaded = self.models.is_loaded();
        ModelStatus {
            name: self.models.name().to_string(),
            // Only report a dimension once the model is resident; asking
            // for it earlier would itself force a load.
            dimension: if loaded {
                self.models.dimension().ok()
            } else {
                None
            },
            loaded,
        }
    }

    fn storage_counts(&self) -> (i64, i64) {
        match SqliteStorage::open(&self.config.db_path) {
            Ok(storage) => {
                let videos = storage.count_videos().unwrap_or(0);
                let embeddings = storage.count_embeddings().unwrap_or(0);
                (videos, embeddings)
            }
            Err(e) => {
                warn!(error = %e, "health check could not open storage");
                (0, 0)
            }
        }
    }
}

/// Map an internal error to its wire form. Model internals stay in the
/// logs; clients see a generic message.
fn error_response(err: ServiceError) -> Response {
    let (code, message) = match &err {
        ServiceError::InvalidInput(msg) => (ErrorCode::InvalidInput, msg.clone()),
        ServiceError::ModelLoad(detail) => {
            error!(detail = %detail, "embedding model failure");
            (
                ErrorCode::ModelUnavailable,
                "embedding model unavailable".to_string(),
            )
        }
        ServiceError::DimensionMismatch { .. } => (ErrorCode::DimensionMismatch, err.to_string()),
        ServiceError::Storage(detail) => {
            error!(detail = %detail, "storage failure");
            (ErrorCode::Internal, "internal storage error".to_string())
        }
    };
    Response::Error(ErrorResponse { code, message })
}
