//! `SQLite` backend: schema, pragmas, and vector-indexed storage.
//!
//! Two tables carry the core data model:
//!
//! - `videos`: metadata keyed by the opaque video id.
//! - `video_embeddings`: a sqlite-vec `vec0` virtual table holding one
//!   fixed-width vector per video, indexed for cosine distance.
//!
//! `vec0` tables cannot declare foreign keys, so the existence invariant
//! (an embedding row exists only with its video row) rests on [`SqliteStorage::upsert`] writing
//! both rows inside a single transaction.
//!
//! The embedding width is pinned in the `meta` table on first write.
//! Changing embedding models means rebuilding the embeddings table; a
//! differing dimension is surfaced as a hard error, never migrated live.

use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use once_cell::sync::OnceCell;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::info;

use crate::codec::StoredVector;
use crate::error::{Result, ServiceError};

const SCHEMA_VERSION: i64 = 1;

const SCHEMA_V1: &str = r"
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS videos (
    id TEXT PRIMARY KEY,
    title TEXT,
    channel_id TEXT,
    published_at TEXT,
    lang TEXT NOT NULL DEFAULT 'en',
    duration_s INTEGER,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
";

static VEC_EXTENSION: OnceCell<()> = OnceCell::new();

/// Register sqlite-vec as a process-wide auto extension. Idempotent; must
/// run before the first connection is opened.
fn register_vec_extension() {
    VEC_EXTENSION.get_or_init(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite_vec::sqlite3_vec_init as *const (),
        )));
    });
}

/// Metadata row for a video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoRecord {
    pub id: String,
    pub title: Option<String>,
    pub channel_id: Option<String>,
    pub published_at: Option<String>,
    pub lang: String,
    pub duration_s: Option<i64>,
}

/// One nearest-neighbor candidate as returned by the index scan.
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub video_id: String,
    pub title: Option<String>,
    /// Cosine distance from the seed (the index's native metric).
    pub distance: f64,
}

pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Open (or create) the database at `path`, applying pragmas and the
    /// base schema. The vec0 embeddings table is created lazily on first
    /// write because its width depends on the loaded model.
    pub fn open(path: &Path) -> Result<Self> {
        register_vec_extension();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .map_err(|e| ServiceError::Storage(format!("creating db directory: {e}")))?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA_V1)?;
        conn.execute(
            "INSERT OR IGNORE INTO meta(key, value) VALUES('schema_version', ?1)",
            params![SCHEMA_VERSION.to_string()],
        )?;

        Ok(Self { conn })
    }

    fn now_millis() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }

    fn meta_get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![key],
                |r| r.get(0),
            )
            .optional()?)
    }

    /// Pinned embedding width, if any embedding has ever been written.
    pub fn embedding_dim(&self) -> Result<Option<usize>> {
        match self.meta_get("embedding_dim")? {
            Some(v) => v
                .parse::<usize>()
                .map(Some)
                .map_err(|e| ServiceError::Storage(format!("corrupt embedding_dim: {e}"))),
            None => Ok(None),
        }
    }

    /// Create the vec0 table for `dim`-wide vectors, or verify the pinned
    /// width matches. Called before the first embedding write.
    pub fn ensure_embedding_table(&self, dim: usize, embedder_id: &str) -> Result<()> {
        if let Some(stored) = self.embedding_dim()? {
            if stored != dim {
                return Err(ServiceError::DimensionMismatch { stored, model: dim });
            }
            return Ok(());
        }

        self.conn.execute_batch(&format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS video_embeddings USING vec0(
                video_id TEXT PRIMARY KEY,
                embedding FLOAT[{dim}] distance_metric=cosine
            );"
        ))?;
        self.conn.execute(
            "INSERT OR REPLACE INTO meta(key, value) VALUES('embedding_dim', ?1)",
            params![dim.to_string()],
        )?;
        self.conn.execute(
            "INSERT OR REPLACE INTO meta(key, value) VALUES('embedder_id', ?1)",
            params![embedder_id],
        )?;
        info!(dim, embedder = embedder_id, "provisioned embeddings table");
        Ok(())
    }

    /// Atomically upsert a video row and its embedding.
    ///
    /// The metadata write is ordered before the embedding write and both
    /// commit together; any failure rolls the whole operation back, so the
    /// video update is never observable without its embedding update.
    /// Conflict semantics are last-write-wins: every mutable metadata
    /// field is overwritten, and the vector is replaced entirely.
    pub fn upsert(&mut self, video: &VideoRecord, vector_text: &str) -> Result<()> {
        let now = Self::now_millis();
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO videos(id, title, channel_id, published_at, lang, duration_s, created_at, updated_at)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                channel_id = excluded.channel_id,
                published_at = excluded.published_at,
                lang = excluded.lang,
                duration_s = excluded.duration_s,
                updated_at = excluded.updated_at",
            params![
                video.id,
                video.title,
                video.channel_id,
                video.published_at,
                video.lang,
                video.duration_s,
                now
            ],
        )?;

        // vec0 has no ON CONFLICT support; replace is delete + insert.
        tx.execute(
            "DELETE FROM video_embeddings WHERE video_id = ?1",
            params![video.id],
        )?;
        tx.execute(
            "INSERT INTO video_embeddings(video_id, embedding) VALUES(?1, ?2)",
            params![video.id, vector_text],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Fetch the stored embedding for a seed id, in whatever shape the
    /// driver returns it. `None` when the seed (or the embeddings table
    /// itself) does not exist.
    pub fn seed_embedding(&self, video_id: &str) -> Result<Option<StoredVector>> {
        if self.embedding_dim()?.is_none() {
            return Ok(None);
        }

        let row = self
            .conn
            .query_row(
                "SELECT embedding FROM video_embeddings WHERE video_id = ?1",
                params![video_id],
                |r| match r.get_ref(0)? {
                    ValueRef::Text(t) => {
                        Ok(StoredVector::Text(String::from_utf8_lossy(t).into_owned()))
                    }
                    ValueRef::Blob(b) => Ok(StoredVector::Blob(b.to_vec())),
                    other => Err(rusqlite::Error::InvalidColumnType(
                        0,
                        "embedding".into(),
                        other.data_type(),
                    )),
                },
            )
            .optional()?;
        Ok(row)
    }

    /// KNN scan: up to `limit` candidates ordered by ascending cosine
    /// distance from the query vector, joined to metadata for titles.
    pub fn nearest(&self, query_vector_text: &str, limit: usize) -> Result<Vec<Neighbor>> {
        if self.embedding_dim()?.is_none() {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(
            "SELECT e.video_id, v.title, e.distance
             FROM (
                 SELECT video_id, distance
                 FROM video_embeddings
                 WHERE embedding MATCH ?1 AND k = ?2
                 ORDER BY distance
             ) AS e
             JOIN videos v ON v.id = e.video_id
             ORDER BY e.distance",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![query_vector_text, limit], |r| {
            Ok(Neighbor {
                video_id: r.get(0)?,
                title: r.get(1)?,
                distance: r.get(2)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Fetch a video's metadata row.
    pub fn get_video(&self, id: &str) -> Result<Option<VideoRecord>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, title, channel_id, published_at, lang, duration_s
                 FROM videos WHERE id = ?1",
                params![id],
                |r| {
                    Ok(VideoRecord {
                        id: r.get(0)?,
                        title: r.get(1)?,
                        channel_id: r.get(2)?,
                        published_at: r.get(3)?,
                        lang: r.get(4)?,
                        duration_s: r.get(5)?,
                    })
                },
            )
            .optional()?)
    }

    pub fn count_videos(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM videos", [], |r| r.get(0))?)
    }

    pub fn count_embeddings(&self) -> Result<i64> {
        if self.embedding_dim()?.is_none() {
            return Ok(0);
        }
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM video_embeddings", [], |r| r.get(0))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;

    fn memory_storage() -> SqliteStorage {
        SqliteStorage::open(Path::new(":memory:")).unwrap()
    }

    fn unit(dim: usize, hot: usize) -> Vec<f32> {
        let mut v = vec![0.0_f32; dim];
        v[hot] = 1.0;
        v
    }

    fn record(id: &str, title: &str) -> VideoRecord {
        VideoRecord {
            id: id.into(),
            title: Some(title.into()),
            channel_id: None,
            published_at: None,
            lang: "en".into(),
            duration_s: None,
        }
    }

    #[test]
    fn upsert_is_idempotent_last_write_wins() {
        let mut s = memory_storage();
        s.ensure_embedding_table(4, "test").unwrap();

        s.upsert(&record("a", "first title"), &codec::encode(&unit(4, 0)))
            .unwrap();
        let mut second = record("a", "second title");
        second.lang = "de".into();
        s.upsert(&second, &codec::encode(&unit(4, 1))).unwrap();

        assert_eq!(s.count_videos().unwrap(), 1);
        assert_eq!(s.count_embeddings().unwrap(), 1);
        let row = s.get_video("a").unwrap().unwrap();
        assert_eq!(row.title.as_deref(), Some("second title"));
        assert_eq!(row.lang, "de");

        let stored = s.seed_embedding("a").unwrap().unwrap().resolve().unwrap();
        assert!((stored[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn failed_embedding_write_rolls_back_metadata() {
        let mut s = memory_storage();
        s.ensure_embedding_table(4, "test").unwrap();

        // Wrong-width vector: the vec0 insert fails after the metadata
        // write in the same transaction.
        let err = s.upsert(&record("a", "t"), &codec::encode(&unit(3, 0)));
        assert!(err.is_err());
        assert_eq!(s.count_videos().unwrap(), 0);
        assert_eq!(s.count_embeddings().unwrap(), 0);
    }

    #[test]
    fn dimension_is_pinned() {
        let s = memory_storage();
        s.ensure_embedding_table(8, "test").unwrap();
        assert_eq!(s.embedding_dim().unwrap(), Some(8));

        let err = s.ensure_embedding_table(16, "test").unwrap_err();
        assert!(matches!(
            err,
            ServiceError::DimensionMismatch {
                stored: 8,
                model: 16
            }
        ));
    }

    #[test]
    fn seed_lookup_missing_is_none() {
        let s = memory_storage();
        // Before any write the embeddings table does not even exist.
        assert!(s.seed_embedding("nope").unwrap().is_none());

        s.ensure_embedding_table(4, "test").unwrap();
        assert!(s.seed_embedding("nope").unwrap().is_none());
    }

    #[test]
    fn nearest_orders_by_cosine_distance() {
        let mut s = memory_storage();
        s.ensure_embedding_table(4, "test").unwrap();

        s.upsert(&record("x", "x"), &codec::encode(&unit(4, 0)))
            .unwrap();
        s.upsert(&record("y", "y"), &codec::encode(&[0.9, 0.1, 0.0, 0.0]))
            .unwrap();
        s.upsert(&record("z", "z"), &codec::encode(&unit(4, 3)))
            .unwrap();

        let hits = s.nearest(&codec::encode(&unit(4, 0)), 10).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].video_id, "x");
        assert!(hits[0].distance < 1e-5);
        assert_eq!(hits[1].video_id, "y");
        assert!(hits[1].distance < hits[2].distance);
    }

    #[test]
    fn nearest_respects_limit() {
        let mut s = memory_storage();
        s.ensure_embedding_table(4, "test").unwrap();
        for i in 0..4 {
            s.upsert(&record(&format!("v{i}"), "t"), &codec::encode(&unit(4, i)))
                .unwrap();
        }
        let hits = s.nearest(&codec::encode(&unit(4, 0)), 2).unwrap();
        assert_eq!(hits.len(), 2);
    }
}
