use async_trait::async_trait;
use quicktube::caption_source::{CaptionSource, VideoId, VideoMetadata};
use quicktube::error::AcquisitionError;
use quicktube::transcript::{Transcript, TranscriptSegment};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone)]
pub struct MockCaptionSource {
    pub segments: Vec<String>,
    pub transcript_calls: Arc<Mutex<Vec<String>>>,
    pub metadata_calls: Arc<Mutex<Vec<String>>>,
    /// Transcript fetches that fail transiently before one succeeds.
    pub transient_failures: Arc<AtomicU32>,
    pub fail_with: Option<AcquisitionError>,
    pub delay: Duration,
}

impl MockCaptionSource {
    pub fn new(segments: &[&str]) -> Self {
        Self {
            segments: segments.iter().map(|s| s.to_string()).collect(),
            transcript_calls: Arc::new(Mutex::new(Vec::new())),
            metadata_calls: Arc::new(Mutex::new(Vec::new())),
            transient_failures: Arc::new(AtomicU32::new(0)),
            fail_with: None,
            delay: Duration::ZERO,
        }
    }

    pub fn failing(error: AcquisitionError) -> Self {
        Self {
            fail_with: Some(error),
            ..Self::new(&["unused"])
        }
    }

    pub fn flaky(segments: &[&str], transient_failures: u32) -> Self {
        let source = Self::new(segments);
        source
            .transient_failures
            .store(transient_failures, Ordering::SeqCst);
        source
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn transcript_call_count(&self) -> usize {
        self.transcript_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl CaptionSource for MockCaptionSource {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn fetch_metadata(&self, id: &VideoId) -> Result<VideoMetadata, AcquisitionError> {
        self.metadata_calls.lock().unwrap().push(id.to_string());
        Ok(VideoMetadata {
            channel: Some("Mock Channel".to_string()),
            duration_seconds: Some(self.segments.len() as u32 * 5),
            ..VideoMetadata::untitled(id.clone(), format!("Video {}", id))
        })
    }

    async fn fetch_transcript(&self, id: &VideoId) -> Result<Transcript, AcquisitionError> {
        self.transcript_calls.lock().unwrap().push(id.to_string());
        tokio::time::sleep(self.delay).await;

        if let Some(ref error) = self.fail_with {
            return Err(error.clone());
        }
        let remaining = self.transient_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(AcquisitionError::Transient("HTTP Error 429: Too Many Requests".into()));
        }

        let segments = self
            .segments
            .iter()
            .enumerate()
            .map(|(i, text)| TranscriptSegment::new(i as f64 * 5.0, (i + 1) as f64 * 5.0, text.clone()))
            .collect();
        Ok(Transcript::new(id.clone(), Some("en".to_string()), segments))
    }
}
