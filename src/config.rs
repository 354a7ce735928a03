//! Environment-driven configuration.
//!
//! All knobs are read through `dotenvy::var` so a `.env` file works in
//! development. The database path is resolved in a documented priority
//! order: `VIDSIM_DB` (explicit file), then `VIDSIM_DATA_DIR` (directory,
//! file name appended), then the platform data directory.

use std::path::PathBuf;

use tracing::warn;

use crate::embed::registry::DEFAULT_MODEL;

/// Database file name inside a data directory.
pub const DB_FILE: &str = "vidsim.db";

/// Default over-fetch margin for similarity queries. Extra candidates
/// requested beyond k to absorb approximate-index recall loss before the
/// exact-similarity truncation; a fixed design constant, not adaptive.
pub const DEFAULT_OVERFETCH_MARGIN: usize = 50;

/// Default transcript truncation bound before encoding, in chars.
pub const DEFAULT_MAX_INPUT_CHARS: usize = 8_000;

#[derive(Debug, Clone)]
pub struct Config {
    /// Embedding model name (`VIDSIM_EMBED_MODEL`).
    pub model_name: String,
    /// Compute device selector (`VIDSIM_DEVICE`). Only "cpu" is wired.
    pub device: String,
    /// Transcript truncation bound (`VIDSIM_MAX_INPUT_CHARS`).
    pub max_input_chars: usize,
    /// Resolved sqlite database path.
    pub db_path: PathBuf,
    /// Whether the path came from explicit configuration rather than the
    /// platform default. Surfaced by health reporting.
    pub db_configured: bool,
    /// Similarity over-fetch margin (`VIDSIM_OVERFETCH_MARGIN`).
    pub overfetch_margin: usize,
    /// Serialize encode calls through one mutex (`VIDSIM_SERIAL_ENCODE`).
    pub serial_encode: bool,
    /// FastEmbed model cache directory (`VIDSIM_MODEL_CACHE_DIR`).
    pub model_cache_dir: Option<PathBuf>,
    /// Daemon socket path (`VIDSIM_SOCKET`).
    pub socket_path: PathBuf,
}

impl Config {
    /// Load configuration from the environment.
    pub fn from_env() -> Self {
        let mut cfg = Self::baseline();

        if let Ok(model) = dotenvy::var("VIDSIM_EMBED_MODEL") {
            cfg.model_name = model;
        }

        if let Ok(device) = dotenvy::var("VIDSIM_DEVICE") {
            if device != "cpu" {
                warn!(device = %device, "device selector not supported, using cpu");
            }
            cfg.device = device;
        }

        if let Ok(val) = dotenvy::var("VIDSIM_MAX_INPUT_CHARS")
            && let Ok(n) = val.parse()
        {
            cfg.max_input_chars = n;
        }

        if let Ok(val) = dotenvy::var("VIDSIM_OVERFETCH_MARGIN")
            && let Ok(n) = val.parse()
        {
            cfg.overfetch_margin = n;
        }

        if let Ok(val) = dotenvy::var("VIDSIM_SERIAL_ENCODE") {
            cfg.serial_encode = val != "0" && !val.eq_ignore_ascii_case("false");
        }

        if let Ok(dir) = dotenvy::var("VIDSIM_MODEL_CACHE_DIR") {
            cfg.model_cache_dir = Some(PathBuf::from(dir));
        }

        if let Ok(path) = dotenvy::var("VIDSIM_SOCKET") {
            cfg.socket_path = PathBuf::from(path);
        }

        // DB path priority: explicit file, then data dir, then platform dir.
        if let Ok(db) = dotenvy::var("VIDSIM_DB") {
            cfg.db_path = PathBuf::from(db);
            cfg.db_configured = true;
        } else if let Ok(dir) = dotenvy::var("VIDSIM_DATA_DIR") {
            cfg.db_path = PathBuf::from(dir).join(DB_FILE);
            cfg.db_configured = true;
        }

        cfg
    }

    /// Defaults before any environment override.
    fn baseline() -> Self {
        Self {
            model_name: DEFAULT_MODEL.to_string(),
            device: "cpu".to_string(),
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
            db_path: default_data_dir().join(DB_FILE),
            db_configured: false,
            overfetch_margin: DEFAULT_OVERFETCH_MARGIN,
            serial_encode: false,
            model_cache_dir: None,
            socket_path: default_socket_path(),
        }
    }

    /// Deterministic offline configuration used by the test suite: hash
    /// embedder, in-memory database, no model cache.
    pub fn for_tests() -> Self {
        let mut cfg = Self::baseline();
        cfg.model_name = "hash".into();
        cfg.db_path = PathBuf::from(":memory:");
        cfg
    }
}

pub fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "vidsim", "vidsim")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".vidsim"))
}

/// Default per-user socket path. The user component is sanitized so an
/// unusual `$USER` cannot steer the path elsewhere.
pub fn default_socket_path() -> PathBuf {
    let user = std::env::var("USER").unwrap_or_else(|_| "unknown".into());
    let safe_user: String = user
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
        .take(64)
        .collect();
    let safe_user = if safe_user.is_empty() {
        "unknown".to_string()
    } else {
        safe_user
    };
    PathBuf::from(format!("/tmp/vidsim-{safe_user}.sock"))
}
