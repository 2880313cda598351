//! SQLite-based result store.

use super::{ResultStore, SummaryResult};
use crate::caption_source::VideoId;
use crate::config::SummaryStyle;
use crate::error::{Result, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};
use uuid::Uuid;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS summaries (
        video_id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        channel TEXT,
        duration_seconds INTEGER,
        thumbnail_url TEXT,
        view_count INTEGER,
        published_at TEXT,
        summary_text TEXT NOT NULL,
        style TEXT NOT NULL,
        language TEXT,
        source_chunk_count INTEGER NOT NULL,
        skipped_chunks TEXT NOT NULL,
        run_id TEXT NOT NULL,
        generated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_summaries_generated_at ON summaries(generated_at);
"#;

const SELECT_COLUMNS: &str = "SELECT video_id, title, channel, duration_seconds, thumbnail_url, view_count, \
                              published_at, summary_text, style, language, source_chunk_count, \
                              skipped_chunks, run_id, generated_at FROM summaries";

/// SQLite-based result store.
pub struct SqliteResultStore {
    conn: Mutex<Connection>,
}

impl SqliteResultStore {
    /// Open (or create) the database at `path`.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrent performance
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Initialized SQLite result store at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::result::Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("Failed to acquire lock: {}", e)))
    }
}

fn unavailable(e: rusqlite::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

/// Columns as stored, before validation.
struct StoredRow {
    video_id: String,
    title: String,
    channel: Option<String>,
    duration_seconds: Option<i64>,
    thumbnail_url: Option<String>,
    view_count: Option<i64>,
    published_at: Option<String>,
    summary_text: String,
    style: String,
    language: Option<String>,
    source_chunk_count: i64,
    skipped_chunks: String,
    run_id: String,
    generated_at: String,
}

impl StoredRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            video_id: row.get(0)?,
            title: row.get(1)?,
            channel: row.get(2)?,
            duration_seconds: row.get(3)?,
            thumbnail_url: row.get(4)?,
            view_count: row.get(5)?,
            published_at: row.get(6)?,
            summary_text: row.get(7)?,
            style: row.get(8)?,
            language: row.get(9)?,
            source_chunk_count: row.get(10)?,
            skipped_chunks: row.get(11)?,
            run_id: row.get(12)?,
            generated_at: row.get(13)?,
        })
    }

    fn decode(self) -> std::result::Result<SummaryResult, StoreError> {
        let corrupt = |field: &str, e: &dyn std::fmt::Display| {
            StoreError::Corrupt(format!("{} for {}: {}", field, self.video_id, e))
        };

        let skipped_chunks: Vec<usize> = serde_json::from_str(&self.skipped_chunks)
            .map_err(|e| corrupt("skipped_chunks", &e))?;
        let source_chunk_count = usize::try_from(self.source_chunk_count)
            .map_err(|e| corrupt("source_chunk_count", &e))?;
        let run_id = Uuid::parse_str(&self.run_id).map_err(|e| corrupt("run_id", &e))?;
        let generated_at = parse_timestamp(&self.generated_at).map_err(|e| corrupt("generated_at", &e))?;
        let published_at = self
            .published_at
            .as_deref()
            .map(parse_timestamp)
            .transpose()
            .map_err(|e| corrupt("published_at", &e))?;
        let duration_seconds = self
            .duration_seconds
            .map(u32::try_from)
            .transpose()
            .map_err(|e| corrupt("duration_seconds", &e))?;
        let view_count = self
            .view_count
            .map(u64::try_from)
            .transpose()
            .map_err(|e| corrupt("view_count", &e))?;
        let style: SummaryStyle = self.style.parse().map_err(|e: String| corrupt("style", &e))?;

        Ok(SummaryResult {
            video_id: VideoId::new(self.video_id),
            title: self.title,
            channel: self.channel,
            duration_seconds,
            thumbnail_url: self.thumbnail_url,
            view_count,
            published_at,
            summary_text: self.summary_text,
            style,
            language: self.language,
            source_chunk_count,
            skipped_chunks,
            run_id,
            generated_at,
        })
    }
}

fn parse_timestamp(value: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Utc))
}

#[async_trait]
impl ResultStore for SqliteResultStore {
    #[instrument(skip(self), fields(video_id = %video_id))]
    async fn get(&self, video_id: &VideoId) -> std::result::Result<Option<SummaryResult>, StoreError> {
        let conn = self.lock()?;

        let row = conn.query_row(
            &format!("{} WHERE video_id = ?1", SELECT_COLUMNS),
            params![video_id.as_str()],
            StoredRow::from_row,
        );

        match row {
            Ok(row) => row.decode().map(Some),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(unavailable(e)),
        }
    }

    #[instrument(skip(self, result), fields(video_id = %result.video_id))]
    async fn put(&self, result: &SummaryResult) -> std::result::Result<(), StoreError> {
        let skipped = serde_json::to_string(&result.skipped_chunks)
            .map_err(|e| StoreError::Unavailable(format!("Failed to serialize skipped chunks: {}", e)))?;

        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO summaries
            (video_id, title, channel, duration_seconds, thumbnail_url, view_count, published_at,
             summary_text, style, language, source_chunk_count, skipped_chunks, run_id, generated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            params![
                result.video_id.as_str(),
                result.title,
                result.channel,
                result.duration_seconds,
                result.thumbnail_url,
                result.view_count.map(|v| v as i64),
                result.published_at.map(|dt| dt.to_rfc3339()),
                result.summary_text,
                result.style.to_string(),
                result.language,
                result.source_chunk_count as i64,
                skipped,
                result.run_id.to_string(),
                result.generated_at.to_rfc3339(),
            ],
        )
        .map_err(unavailable)?;

        debug!("Stored summary");
        Ok(())
    }

    async fn list(&self) -> std::result::Result<Vec<SummaryResult>, StoreError> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare(&format!("{} ORDER BY generated_at DESC", SELECT_COLUMNS))
            .map_err(unavailable)?;
        let rows = stmt
            .query_map([], StoredRow::from_row)
            .map_err(unavailable)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(unavailable)?;

        rows.into_iter().map(StoredRow::decode).collect()
    }
}
