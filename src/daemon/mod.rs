//! Long-lived service process for warm-model ingest and similarity.
//!
//! The daemon listens on a Unix Domain Socket and keeps the embedding
//! model resident across requests; the CLI subcommands talk to it
//! through [`client::DaemonClient`]. First request (or an explicit
//! warmup) pays the model load cost, health checks never do.

pub mod client;
pub mod core;
pub mod protocol;

pub use client::{ClientConfig, ClientError, DaemonClient};
pub use core::{DaemonConfig, VidsimDaemon};
pub use protocol::{PROTOCOL_VERSION, Request, Response};
