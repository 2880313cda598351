use async_trait::async_trait;
use quicktube::caption_source::VideoId;
use quicktube::error::StoreError;
use quicktube::store::{MemoryResultStore, ResultStore, SummaryResult};
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
pub struct MockStore {
    pub inner: Arc<MemoryResultStore>,
    pub gets: Arc<Mutex<Vec<String>>>,
    pub puts: Arc<Mutex<Vec<SummaryResult>>>,
    pub fail_reads: bool,
    pub fail_writes: bool,
}

impl MockStore {
    pub fn failing_writes() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    pub fn failing_reads() -> Self {
        Self {
            fail_reads: true,
            ..Self::default()
        }
    }

    pub fn put_count(&self) -> usize {
        self.puts.lock().unwrap().len()
    }
}

#[async_trait]
impl ResultStore for MockStore {
    async fn get(&self, video_id: &VideoId) -> Result<Option<SummaryResult>, StoreError> {
        self.gets.lock().unwrap().push(video_id.to_string());
        if self.fail_reads {
            return Err(StoreError::Corrupt("unreadable row".into()));
        }
        self.inner.get(video_id).await
    }

    async fn put(&self, result: &SummaryResult) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::Unavailable("disk full".into()));
        }
        self.puts.lock().unwrap().push(result.clone());
        self.inner.put(result).await
    }

    async fn list(&self) -> Result<Vec<SummaryResult>, StoreError> {
        self.inner.list().await
    }
}
