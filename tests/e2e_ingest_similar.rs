//! End-to-end ingest and similarity flows against a real database file.
//!
//! Runs entirely offline: the deterministic hashing embedder stands in
//! for the semantic model, and databases live in per-test temp dirs.

use std::sync::Arc;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

use vidsim::config::Config;
use vidsim::embed::ModelManager;
use vidsim::ingest::{IngestPipeline, IngestRequest};
use vidsim::similar::SimilarityQueryEngine;
use vidsim::storage::SqliteStorage;

fn file_config(dir: &TempDir) -> Config {
    let mut cfg = Config::for_tests();
    cfg.db_path = dir.path().join("vidsim.db");
    cfg
}

fn request(id: &str, transcript: &str) -> IngestRequest {
    IngestRequest {
        video_id: id.into(),
        title: Some(format!("video {id}")),
        transcript: transcript.into(),
        channel_id: Some("chan-1".into()),
        published_at: Some("2024-06-01T00:00:00Z".into()),
        lang: None,
        duration_s: Some(600),
    }
}

#[test]
fn ingest_persists_across_connections() {
    let dir = TempDir::new().unwrap();
    let config = file_config(&dir);
    let models = Arc::new(ModelManager::new(config.clone()).unwrap());
    let pipeline = IngestPipeline::new(config.clone(), models);

    pipeline
        .ingest(&request("a", "rust async runtime deep dive"))
        .unwrap();

    // Fresh connection sees the row and its embedding.
    let storage = SqliteStorage::open(&config.db_path).unwrap();
    assert_eq!(storage.count_videos().unwrap(), 1);
    assert_eq!(storage.count_embeddings().unwrap(), 1);
    assert_eq!(storage.embedding_dim().unwrap(), Some(384));
}

#[test]
fn similar_ranks_overlapping_transcripts_higher() {
    let dir = TempDir::new().unwrap();
    let config = file_config(&dir);
    let models = Arc::new(ModelManager::new(config.clone()).unwrap());
    let pipeline = IngestPipeline::new(config.clone(), models);

    pipeline
        .ingest(&request("seed", "ownership borrowing lifetimes in rust"))
        .unwrap();
    pipeline
        .ingest(&request(
            "close",
            "ownership borrowing lifetimes in rust explained",
        ))
        .unwrap();
    pipeline
        .ingest(&request("far", "sourdough starter hydration baking"))
        .unwrap();

    let engine = SimilarityQueryEngine::new(config);
    let hits = engine.similar("seed", 10).unwrap();

    assert_eq!(hits[0].video_id, "close");
    assert!(hits.iter().all(|h| h.video_id != "seed"));
    let far = hits.iter().find(|h| h.video_id == "far").unwrap();
    assert!(hits[0].sim > far.sim);
}

#[test]
fn reingest_moves_a_video_in_the_ranking() {
    let dir = TempDir::new().unwrap();
    let config = file_config(&dir);
    let models = Arc::new(ModelManager::new(config.clone()).unwrap());
    let pipeline = IngestPipeline::new(config.clone(), models);

    pipeline
        .ingest(&request("seed", "guitar chord shapes for beginners"))
        .unwrap();
    pipeline
        .ingest(&request("other", "tax filing deadlines and deductions"))
        .unwrap();

    let engine = SimilarityQueryEngine::new(config.clone());
    let before = engine.similar("seed", 5).unwrap();
    let before_sim = before.iter().find(|h| h.video_id == "other").unwrap().sim;

    // Overwrite with a transcript that shares the seed's vocabulary.
    pipeline
        .ingest(&request("other", "guitar chord shapes practice routine"))
        .unwrap();

    let after = engine.similar("seed", 5).unwrap();
    let after_sim = after.iter().find(|h| h.video_id == "other").unwrap().sim;
    assert!(after_sim > before_sim);

    // Still exactly one row per id.
    let storage = SqliteStorage::open(&config.db_path).unwrap();
    assert_eq!(storage.count_videos().unwrap(), 2);
    assert_eq!(storage.count_embeddings().unwrap(), 2);
}

#[test]
fn missing_seed_returns_empty() {
    let dir = TempDir::new().unwrap();
    let config = file_config(&dir);
    let engine = SimilarityQueryEngine::new(config);
    assert!(engine.similar("never-ingested", 10).unwrap().is_empty());
}

#[test]
fn dimension_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let config = file_config(&dir);
    let models = Arc::new(ModelManager::new(config.clone()).unwrap());
    let pipeline = IngestPipeline::new(config.clone(), models);
    pipeline.ingest(&request("a", "first transcript")).unwrap();

    // The pinned width is visible to a brand-new connection and a second
    // ingest with the same model still succeeds.
    let storage = SqliteStorage::open(&config.db_path).unwrap();
    assert_eq!(storage.embedding_dim().unwrap(), Some(384));
    drop(storage);
    pipeline.ingest(&request("b", "second transcript")).unwrap();
}

// CLI surface, driven through the built binary.

#[test]
fn cli_ingest_then_similar() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("cli.db");

    cargo_bin_cmd!("vidsim")
        .args(["ingest", "--id", "a", "--transcript", "rust traits and generics"])
        .env("VIDSIM_DB", &db)
        .env("VIDSIM_EMBED_MODEL", "hash")
        .assert()
        .success()
        .stdout(predicate::str::contains("ingested a"));

    cargo_bin_cmd!("vidsim")
        .args(["ingest", "--id", "b", "--transcript", "rust traits and generics tutorial"])
        .env("VIDSIM_DB", &db)
        .env("VIDSIM_EMBED_MODEL", "hash")
        .assert()
        .success();

    let output = cargo_bin_cmd!("vidsim")
        .args(["similar", "a", "-k", "5"])
        .env("VIDSIM_DB", &db)
        .env("VIDSIM_EMBED_MODEL", "hash")
        .output()
        .expect("similar command");
    assert!(output.status.success());

    let hits: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let hits = hits.as_array().unwrap();
    assert_eq!(hits[0]["video_id"], "b");
}

#[test]
fn cli_ingest_rejects_blank_transcript() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("cli.db");

    cargo_bin_cmd!("vidsim")
        .args(["ingest", "--id", "a", "--transcript", "   "])
        .env("VIDSIM_DB", &db)
        .env("VIDSIM_EMBED_MODEL", "hash")
        .assert()
        .failure()
        .stderr(predicate::str::contains("transcript"));
}

#[test]
fn cli_health_reports_counts() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("cli.db");

    cargo_bin_cmd!("vidsim")
        .args(["ingest", "--id", "a", "--transcript", "some words"])
        .env("VIDSIM_DB", &db)
        .env("VIDSIM_EMBED_MODEL", "hash")
        .assert()
        .success();

    cargo_bin_cmd!("vidsim")
        .arg("health")
        .env("VIDSIM_DB", &db)
        .env("VIDSIM_EMBED_MODEL", "hash")
        .assert()
        .success()
        .stdout(predicate::str::contains("videos: 1"))
        .stdout(predicate::str::contains("embeddings: 1"));
}

#[test]
fn cli_model_loads_and_reports_dimension() {
    cargo_bin_cmd!("vidsim")
        .args(["model"])
        .env("VIDSIM_EMBED_MODEL", "hash")
        .assert()
        .success()
        .stdout(predicate::str::contains("model: hash"))
        .stdout(predicate::str::contains("dimension: 384"));
}

#[test]
fn cli_rejects_unknown_model() {
    cargo_bin_cmd!("vidsim")
        .args(["model"])
        .env("VIDSIM_EMBED_MODEL", "bogus")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown embedding model"));
}
