use async_trait::async_trait;
use quicktube::error::SummarizeFailure;
use quicktube::summarization::{SummaryRequest, SummaryStage, Summarizer};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone)]
pub struct MockSummarizer {
    pub calls: Arc<Mutex<Vec<SummaryRequest>>>,
    pub failing_chunks: HashSet<usize>,
    /// Delay every call by this much instead of the default ordering scramble.
    pub fixed_delay: Option<Duration>,
}

impl Default for MockSummarizer {
    fn default() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            failing_chunks: HashSet::new(),
            fixed_delay: None,
        }
    }
}

impl MockSummarizer {
    pub fn failing(chunks: &[usize]) -> Self {
        Self {
            failing_chunks: chunks.iter().copied().collect(),
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            fixed_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn chunk_calls(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| matches!(r.stage, SummaryStage::Chunk { .. }))
            .count()
    }

    pub fn merge_calls(&self) -> Vec<SummaryRequest> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| matches!(r.stage, SummaryStage::Merge { .. }))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Summarizer for MockSummarizer {
    async fn summarize(&self, request: &SummaryRequest) -> Result<String, SummarizeFailure> {
        self.calls.lock().unwrap().push(request.clone());

        match request.stage {
            SummaryStage::Chunk { index, total } => {
                // Later chunks finish first unless a fixed delay is set.
                let delay = self
                    .fixed_delay
                    .unwrap_or_else(|| Duration::from_millis(((total - index) * 25) as u64));
                tokio::time::sleep(delay).await;

                if self.failing_chunks.contains(&index) {
                    return Err(SummarizeFailure::Permanent(format!("chunk {} rejected", index)));
                }
                Ok(format!("summary of chunk {}", index))
            }
            SummaryStage::Merge { parts } => Ok(format!("merged summary of {} parts", parts)),
        }
    }
}
