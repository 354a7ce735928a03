//! Ingest pipeline: transcript to normalized embedding to atomic dual write.
//!
//! Validation happens before any side effect; the model may be lazily
//! loaded as a side effect of the first call (a latency spike, not an
//! error). The metadata and embedding writes run in one storage
//! transaction, so a failure at any point leaves no partial state and
//! repeating the same ingest never creates duplicate rows.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codec;
use crate::config::Config;
use crate::embed::ModelManager;
use crate::error::{Result, ServiceError};
use crate::storage::{SqliteStorage, VideoRecord};

/// One transcript to ingest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    pub video_id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub transcript: String,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default)]
    pub duration_s: Option<i64>,
}

pub struct IngestPipeline {
    config: Config,
    models: Arc<ModelManager>,
}

impl IngestPipeline {
    pub fn new(config: Config, models: Arc<ModelManager>) -> Self {
        Self { config, models }
    }

    /// Ingest against a fresh short-lived storage connection.
    pub fn ingest(&self, req: &IngestRequest) -> Result<()> {
        let mut storage = SqliteStorage::open(&self.config.db_path)?;
        self.ingest_with(&mut storage, req)
    }

    /// Ingest against a caller-provided storage handle.
    pub fn ingest_with(&self, storage: &mut SqliteStorage, req: &IngestRequest) -> Result<()> {
        if req.video_id.trim().is_empty() {
            return Err(ServiceError::InvalidInput("video_id is empty".into()));
        }
        if req.transcript.trim().is_empty() {
            return Err(ServiceError::InvalidInput(
                "transcript is empty or whitespace-only".into(),
            ));
        }

        let vector = self.models.encode(&req.transcript)?;
        storage.ensure_embedding_table(vector.len(), self.models.name())?;

        let record = VideoRecord {
            id: req.video_id.clone(),
            title: req.title.clone(),
            channel_id: req.channel_id.clone(),
            published_at: req.published_at.clone(),
            lang: req
                .lang
                .clone()
                .filter(|l| !l.trim().is_empty())
                .unwrap_or_else(|| "en".to_string()),
            duration_s: req.duration_s,
        };
        storage.upsert(&record, &codec::encode(&vector))?;

        debug!(video_id = %req.video_id, dim = vector.len(), "ingested transcript");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn pipeline() -> IngestPipeline {
        let config = Config::for_tests();
        let models = Arc::new(ModelManager::new(config.clone()).unwrap());
        IngestPipeline::new(config, models)
    }

    fn request(id: &str, transcript: &str) -> IngestRequest {
        IngestRequest {
            video_id: id.into(),
            title: Some(format!("title for {id}")),
            transcript: transcript.into(),
            channel_id: None,
            published_at: None,
            lang: None,
            duration_s: None,
        }
    }

    #[test]
    fn rejects_empty_transcript_before_side_effects() {
        let p = pipeline();
        let mut storage = SqliteStorage::open(Path::new(":memory:")).unwrap();

        let err = p
            .ingest_with(&mut storage, &request("a", "   \n\t"))
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
        assert_eq!(storage.count_videos().unwrap(), 0);
        // The model was never even consulted, so no table was provisioned.
        assert_eq!(storage.embedding_dim().unwrap(), None);
    }

    #[test]
    fn rejects_empty_id() {
        let p = pipeline();
        let mut storage = SqliteStorage::open(Path::new(":memory:")).unwrap();
        let err = p
            .ingest_with(&mut storage, &request("  ", "some words"))
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[test]
    fn ingest_writes_both_rows() {
        let p = pipeline();
        let mut storage = SqliteStorage::open(Path::new(":memory:")).unwrap();
        p.ingest_with(&mut storage, &request("a", "the cat sat on the mat"))
            .unwrap();

        assert_eq!(storage.count_videos().unwrap(), 1);
        assert_eq!(storage.count_embeddings().unwrap(), 1);
        let v = storage
            .seed_embedding("a")
            .unwrap()
            .unwrap()
            .resolve()
            .unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn repeated_ingest_overwrites_metadata() {
        let p = pipeline();
        let mut storage = SqliteStorage::open(Path::new(":memory:")).unwrap();
        p.ingest_with(&mut storage, &request("a", "first transcript words"))
            .unwrap();

        let mut second = request("a", "completely different words here");
        second.title = Some("updated".into());
        second.lang = Some("fr".into());
        p.ingest_with(&mut storage, &second).unwrap();

        assert_eq!(storage.count_videos().unwrap(), 1);
        assert_eq!(storage.count_embeddings().unwrap(), 1);
        let row = storage.get_video("a").unwrap().unwrap();
        assert_eq!(row.title.as_deref(), Some("updated"));
        assert_eq!(row.lang, "fr");
    }

    #[test]
    fn lang_defaults_to_en() {
        let p = pipeline();
        let mut storage = SqliteStorage::open(Path::new(":memory:")).unwrap();
        p.ingest_with(&mut storage, &request("a", "hello transcript"))
            .unwrap();
        assert_eq!(storage.get_video("a").unwrap().unwrap().lang, "en");
    }
}
