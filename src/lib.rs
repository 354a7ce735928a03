pub mod codec;
pub mod config;
pub mod daemon;
pub mod embed;
pub mod error;
pub mod ingest;
pub mod similar;
pub mod storage;

use std::io::Read as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use config::Config;
use daemon::protocol::{Request, Response};
use daemon::{ClientConfig, DaemonClient, DaemonConfig, VidsimDaemon};
use embed::ModelManager;
use ingest::{IngestPipeline, IngestRequest};
use similar::SimilarityQueryEngine;
use storage::SqliteStorage;

/// Command-line interface.
#[derive(Parser, Debug)]
#[command(
    name = "vidsim",
    version,
    about = "Transcript embedding ingestion and similarity search"
)]
pub struct Cli {
    /// Path to the SQLite database (defaults to VIDSIM_DB or platform data dir)
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Directory for the database file (ignored when --db is given)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Daemon socket path (defaults to VIDSIM_SOCKET or /tmp/vidsim-$USER.sock)
    #[arg(long)]
    pub socket: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the daemon in the foreground
    Serve,
    /// Embed a transcript and store it
    Ingest {
        /// Video identifier
        #[arg(long)]
        id: String,

        /// Display title
        #[arg(long)]
        title: Option<String>,

        /// Transcript text; reads stdin when omitted
        #[arg(long)]
        transcript: Option<String>,

        /// Read the transcript from a file instead
        #[arg(long, conflicts_with = "transcript")]
        transcript_file: Option<PathBuf>,

        #[arg(long)]
        channel_id: Option<String>,

        /// Publication timestamp, RFC 3339
        #[arg(long)]
        published_at: Option<String>,

        /// Transcript language code (defaults to "en")
        #[arg(long)]
        lang: Option<String>,

        /// Duration in seconds
        #[arg(long)]
        duration_s: Option<i64>,

        /// Route through a running daemon instead of loading the model here
        #[arg(long)]
        daemon: bool,
    },
    /// List videos most similar to a stored one
    Similar {
        /// Seed video identifier
        id: String,

        /// Number of neighbors to return
        #[arg(short, long, default_value_t = daemon::protocol::DEFAULT_K)]
        k: usize,

        /// Route through a running daemon
        #[arg(long)]
        daemon: bool,
    },
    /// Load the embedding model and print its name and dimension
    Model {
        /// Query a running daemon instead of loading locally
        #[arg(long)]
        daemon: bool,
    },
    /// Force the embedding model resident (downloads weights if needed)
    Warmup {
        /// Warm a running daemon instead of this process
        #[arg(long)]
        daemon: bool,
    },
    /// Report database counts and model state
    Health {
        /// Query a running daemon
        #[arg(long)]
        daemon: bool,
    },
    /// Ask a running daemon to shut down
    Shutdown,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(db) = cli.db {
        config.db_path = db;
        config.db_configured = true;
    } else if let Some(dir) = cli.data_dir {
        config.db_path = dir.join(config::DB_FILE);
        config.db_configured = true;
    }
    if let Some(socket) = cli.socket {
        config.socket_path = socket;
    }

    match cli.command {
        Commands::Serve => {
            let daemon_config = DaemonConfig::from_env(&config);
            let daemon = Arc::new(VidsimDaemon::new(daemon_config, config)?);
            daemon.run().context("daemon exited with an error")?;
            Ok(())
        }

        Commands::Ingest {
            id,
            title,
            transcript,
            transcript_file,
            channel_id,
            published_at,
            lang,
            duration_s,
            daemon,
        } => {
            let transcript = match (transcript, transcript_file) {
                (Some(text), _) => text,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("reading transcript from {}", path.display()))?,
                (None, None) => {
                    let mut buf = String::new();
                    std::io::stdin().read_to_string(&mut buf)?;
                    buf
                }
            };
            let req = IngestRequest {
                video_id: id,
                title,
                transcript,
                channel_id,
                published_at,
                lang,
                duration_s,
            };

            if daemon {
                match daemon_request(&config, Request::Ingest(req))? {
                    Response::Ingest { video_id } => {
                        println!("ingested {video_id}");
                        Ok(())
                    }
                    other => bail_on(other),
                }
            } else {
                let models = Arc::new(ModelManager::new(config.clone())?);
                let pipeline = IngestPipeline::new(config, models);
                pipeline.ingest(&req)?;
                println!("ingested {}", req.video_id);
                Ok(())
            }
        }

        Commands::Similar { id, k, daemon } => {
            let hits = if daemon {
                match daemon_request(&config, Request::Similar { seed_id: id, k })? {
                    Response::Similar { hits } => hits,
                    other => return bail_on(other),
                }
            } else {
                SimilarityQueryEngine::new(config).similar(&id, k)?
            };
            println!("{}", serde_json::to_string_pretty(&hits)?);
            Ok(())
        }

        Commands::Model { daemon } => {
            if daemon {
                match daemon_request(&config, Request::ModelInfo)? {
                    Response::ModelInfo(status) => {
                        println!("{}", serde_json::to_string_pretty(&status)?);
                        Ok(())
                    }
                    other => bail_on(other),
                }
            } else {
                let models = ModelManager::new(config)?;
                let dimension = models.dimension()?;
                println!("model: {}", models.name());
                println!("dimension: {dimension}");
                println!("semantic: {}", models.is_semantic());
                Ok(())
            }
        }

        Commands::Warmup { daemon } => {
            if daemon {
                match daemon_request(&config, Request::Warmup)? {
                    Response::Warmup(status) => {
                        println!("{}", serde_json::to_string_pretty(&status)?);
                        Ok(())
                    }
                    other => bail_on(other),
                }
            } else {
                let models = ModelManager::new(config)?;
                models.warmup()?;
                println!("model: {} (dimension {})", models.name(), models.dimension()?);
                Ok(())
            }
        }

        Commands::Health { daemon } => {
            if daemon {
                match daemon_request(&config, Request::Health)? {
                    Response::Health(status) => {
                        println!("{}", serde_json::to_string_pretty(&status)?);
                        Ok(())
                    }
                    other => bail_on(other),
                }
            } else {
                let models = ModelManager::new(config.clone())?;
                let storage = SqliteStorage::open(&config.db_path)?;
                println!("db: {}", config.db_path.display());
                println!("videos: {}", storage.count_videos()?);
                println!("embeddings: {}", storage.count_embeddings()?);
                println!("model: {} (loaded: {})", models.name(), models.is_loaded());
                Ok(())
            }
        }

        Commands::Shutdown => match daemon_request(&config, Request::Shutdown)? {
            Response::Shutdown { message } => {
                println!("{message}");
                Ok(())
            }
            other => bail_on(other),
        },
    }
}

fn daemon_request(config: &Config, request: Request) -> Result<Response> {
    let client = DaemonClient::new(ClientConfig::new(config.socket_path.clone()));
    client.connect()?;
    Ok(client.request(request)?)
}

fn bail_on<T>(response: Response) -> Result<T> {
    match response {
        Response::Error(err) => bail!("daemon error ({:?}): {}", err.code, err.message),
        other => bail!("unexpected daemon response: {other:?}"),
    }
}
