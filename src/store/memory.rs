//! In-memory result store.
//!
//! Useful for testing and one-off runs; contents are lost on exit.

use super::{ResultStore, SummaryResult};
use crate::caption_source::VideoId;
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory result store.
pub struct MemoryResultStore {
    results: RwLock<HashMap<VideoId, SummaryResult>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self {
            results: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryResultStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(e: std::sync::PoisonError<T>) -> StoreError {
    StoreError::Unavailable(format!("Failed to acquire lock: {}", e))
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn get(&self, video_id: &VideoId) -> Result<Option<SummaryResult>, StoreError> {
        let results = self.results.read().map_err(poisoned)?;
        Ok(results.get(video_id).cloned())
    }

    async fn put(&self, result: &SummaryResult) -> Result<(), StoreError> {
        let mut results = self.results.write().map_err(poisoned)?;
        results.insert(result.video_id.clone(), result.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SummaryResult>, StoreError> {
        let results = self.results.read().map_err(poisoned)?;
        let mut all: Vec<SummaryResult> = results.values().cloned().collect();
        all.sort_by(|a, b| b.generated_at.cmp(&a.generated_at));
        Ok(all)
    }
}
