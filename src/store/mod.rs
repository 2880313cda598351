//! Result store abstraction for Quicktube.
//!
//! Holds at most one summary per video; a newer write replaces the older one.

mod memory;
mod sqlite;

pub use memory::MemoryResultStore;
pub use sqlite::SqliteResultStore;

use crate::caption_source::VideoId;
use crate::config::{Settings, StoreProvider, SummaryStyle};
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// A finished summary for one video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryResult {
    pub video_id: VideoId,
    pub title: String,
    pub channel: Option<String>,
    pub duration_seconds: Option<u32>,
    pub thumbnail_url: Option<String>,
    pub view_count: Option<u64>,
    pub published_at: Option<DateTime<Utc>>,
    pub summary_text: String,
    /// Layout the summary was written in.
    pub style: SummaryStyle,
    /// Caption language the summary was produced from.
    pub language: Option<String>,
    /// Chunks whose summary contributed to the result.
    pub source_chunk_count: usize,
    /// Chunks left out because their summary failed. Empty for full coverage.
    pub skipped_chunks: Vec<usize>,
    /// Run that produced this result.
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
}

impl SummaryResult {
    /// Whether every chunk of the transcript is covered.
    pub fn is_complete(&self) -> bool {
        self.skipped_chunks.is_empty()
    }
}

/// Trait for summary persistence backends.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Fetch the stored summary for a video. Absence is `Ok(None)`.
    async fn get(&self, video_id: &VideoId) -> Result<Option<SummaryResult>, StoreError>;

    /// Store a summary, replacing any previous one for the same video.
    async fn put(&self, result: &SummaryResult) -> Result<(), StoreError>;

    /// All stored summaries, newest first.
    async fn list(&self) -> Result<Vec<SummaryResult>, StoreError>;
}

/// Create the store selected in the settings.
pub fn create_store(settings: &Settings) -> crate::error::Result<Arc<dyn ResultStore>> {
    let store: Arc<dyn ResultStore> = match settings.store.provider {
        StoreProvider::Sqlite => Arc::new(SqliteResultStore::new(&settings.sqlite_path())?),
        StoreProvider::Memory => Arc::new(MemoryResultStore::new()),
    };
    Ok(store)
}

#[cfg(test)]
pub(crate) fn sample_result(video_id: &str) -> SummaryResult {
    SummaryResult {
        video_id: VideoId::new(video_id),
        title: "A talk about Rust".to_string(),
        channel: Some("Rust Conf".to_string()),
        duration_seconds: Some(1800),
        thumbnail_url: Some("https://i.ytimg.com/vi/abc/hqdefault.jpg".to_string()),
        view_count: Some(42_000),
        published_at: Some(Utc::now()),
        summary_text: "## Main summary\nOwnership explained.".to_string(),
        style: SummaryStyle::Structured,
        language: Some("en".to_string()),
        source_chunk_count: 3,
        skipped_chunks: vec![1],
        run_id: Uuid::new_v4(),
        generated_at: Utc::now(),
    }
}
