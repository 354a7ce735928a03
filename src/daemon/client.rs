//! Blocking client for the vidsim daemon.
//!
//! Connects over the Unix Domain Socket and issues one framed request
//! at a time. Used by the CLI subcommands so that a long-lived daemon
//! keeps the embedding model warm across invocations.

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use super::protocol::{
    FramedMessage, MAX_FRAME_BYTES, Request, Response, decode_message, encode_message,
};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("daemon not reachable at {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("daemon io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Configuration for the daemon client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub socket_path: PathBuf,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// Unix Domain Socket client for the vidsim daemon.
pub struct DaemonClient {
    config: ClientConfig,
    connection: Mutex<Option<UnixStream>>,
    request_counter: AtomicU64,
}

impl DaemonClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            connection: Mutex::new(None),
            request_counter: AtomicU64::new(0),
        }
    }

    /// Connect to a running daemon.
    pub fn connect(&self) -> Result<(), ClientError> {
        let stream =
            UnixStream::connect(&self.config.socket_path).map_err(|source| ClientError::Connect {
                path: self.config.socket_path.clone(),
                source,
            })?;
        stream.set_read_timeout(Some(self.config.request_timeout))?;
        stream.set_write_timeout(Some(self.config.request_timeout))?;
        debug!(socket = %self.config.socket_path.display(), "connected to daemon");
        *self.connection.lock() = Some(stream);
        Ok(())
    }

    /// Send one request and wait for its response.
    pub fn request(&self, request: Request) -> Result<Response, ClientError> {
        let mut guard = self.connection.lock();
        let stream = guard
            .as_mut()
            .ok_or_else(|| ClientError::Protocol("client not connected".to_string()))?;

        let id = self.request_counter.fetch_add(1, Ordering::Relaxed);
        let msg = FramedMessage::new(format!("req-{id}"), request);
        let encoded = encode_message(&msg).map_err(|e| ClientError::Protocol(e.to_string()))?;
        stream.write_all(&encoded)?;

        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf)?;
        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_FRAME_BYTES {
            return Err(ClientError::Protocol(format!(
                "response frame too large: {len} bytes"
            )));
        }
        let mut payload = vec![0u8; len];
        stream.read_exact(&mut payload)?;

        let decoded: FramedMessage<Response> =
            decode_message(&payload).map_err(|e| ClientError::Protocol(e.to_string()))?;
        Ok(decoded.payload)
    }
}
