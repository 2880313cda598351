//! Transcript-to-summary pipeline.
//!
//! A run moves through these stages:
//!
//! ```text
//! Requested -> CheckingCache -> CacheHit -> Done
//!                            \-> Acquiring -> Normalizing -> Summarizing -> Storing -> Done
//!                                                                               \-> DoneWithWarning
//! ```
//!
//! Acquiring, Normalizing and Summarizing may end in `Failed`. A store failure
//! never discards a produced summary; the run ends in `DoneWithWarning`.
//! Concurrent requests for the same video share one run. The run is dropped,
//! and nothing is stored, once every request waiting on it has gone away.

use crate::caption_source::{CaptionSource, VideoId, VideoMetadata, YoutubeCaptionSource};
use crate::chunking::{normalize, Chunk};
use crate::config::{Prompts, Settings, SummaryStyle};
use crate::error::{PipelineError, StoreError, SummarizationError};
use crate::retry::{run_with_retry, Attempted, RetryPolicy};
use crate::store::{create_store, ResultStore, SummaryResult};
use crate::summarization::{
    OpenAiSummarizer, OrchestratorConfig, SummarizationOrchestrator, Summarizer,
};
use crate::transcript::Transcript;
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Requested,
    CheckingCache,
    CacheHit,
    Acquiring,
    Normalizing,
    Summarizing,
    Storing,
    Done,
    DoneWithWarning,
    Failed,
}

impl std::fmt::Display for RunStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RunStage::Requested => "requested",
            RunStage::CheckingCache => "checking the cache",
            RunStage::CacheHit => "serving from cache",
            RunStage::Acquiring => "acquiring captions",
            RunStage::Normalizing => "normalizing the transcript",
            RunStage::Summarizing => "summarizing",
            RunStage::Storing => "storing the result",
            RunStage::Done => "done",
            RunStage::DoneWithWarning => "done with warning",
            RunStage::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Limits and tuning for pipeline runs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Character budget per transcript chunk.
    pub max_chunk_chars: usize,
    /// Retry policy for caption and metadata fetches.
    pub acquisition_retry: RetryPolicy,
    /// Limit for one caption or metadata fetch attempt.
    pub acquisition_timeout: Duration,
    /// Limit for one store read or write.
    pub store_timeout: Duration,
    /// Limit for a whole run, retries included.
    pub run_timeout: Duration,
    /// Summary layout when a request does not pick one.
    pub style: SummaryStyle,
    pub orchestrator: OrchestratorConfig,
}

impl PipelineConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_chunk_chars: settings.chunking.max_chunk_chars,
            acquisition_retry: RetryPolicy::from_settings(&settings.retry),
            acquisition_timeout: settings.timeouts.acquisition(),
            store_timeout: settings.timeouts.store(),
            run_timeout: settings.timeouts.run(),
            style: settings.summarization.style,
            orchestrator: OrchestratorConfig::from_settings(settings),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// Per-request options.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Skip the cache read and replace any stored summary.
    pub force: bool,
    /// Cancels the run. Requests that join an in-flight run share its token.
    pub cancel: CancellationToken,
    /// Summary layout; `None` uses the configured one. A cached summary in
    /// another layout counts as a miss.
    pub style: Option<SummaryStyle>,
}

impl GenerateOptions {
    pub fn forced() -> Self {
        Self {
            force: true,
            ..Default::default()
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_style(mut self, style: SummaryStyle) -> Self {
        self.style = Some(style);
        self
    }
}

/// How a summary was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultOrigin {
    Cache,
    Generated,
}

/// A successful run.
#[derive(Debug, Clone)]
pub struct SummaryOutcome {
    pub result: SummaryResult,
    pub origin: ResultOrigin,
    /// Store problem met along the way (failed cache read or write).
    pub warning: Option<StoreError>,
}

impl SummaryOutcome {
    /// Terminal stage of the run.
    pub fn stage(&self) -> RunStage {
        if self.warning.is_some() {
            RunStage::DoneWithWarning
        } else {
            RunStage::Done
        }
    }
}

type RunResult = Result<SummaryOutcome, PipelineError>;
type SharedRun = Shared<BoxFuture<'static, RunResult>>;

/// Records the current stage so a timed-out run can report where it stopped.
struct StageTracker {
    stage: Mutex<RunStage>,
}

impl StageTracker {
    fn new() -> Self {
        Self {
            stage: Mutex::new(RunStage::Requested),
        }
    }

    fn set(&self, next: RunStage) {
        let mut stage = self.stage.lock().unwrap_or_else(|e| e.into_inner());
        info!(from = %*stage, to = %next, "Stage transition");
        *stage = next;
    }

    fn get(&self) -> RunStage {
        *self.stage.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A run other requests can join.
struct InFlightRun {
    /// Tells this run apart from later runs for the same video.
    generation: u64,
    /// Requests currently awaiting the run.
    waiters: usize,
    run: SharedRun,
}

struct PipelineInner {
    source: Arc<dyn CaptionSource>,
    orchestrator: SummarizationOrchestrator,
    store: Arc<dyn ResultStore>,
    config: PipelineConfig,
    in_flight: Mutex<HashMap<VideoId, InFlightRun>>,
    next_generation: AtomicU64,
}

/// Held by each request awaiting a run. The last one to leave before the run
/// completes removes it, which drops the run and everything it has in flight.
struct Waiter<'a> {
    inner: &'a PipelineInner,
    video_id: VideoId,
    generation: u64,
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.inner.lock_in_flight();
        let last = match in_flight.get_mut(&self.video_id) {
            Some(entry) if entry.generation == self.generation => {
                entry.waiters -= 1;
                entry.waiters == 0
            }
            _ => false,
        };
        let abandoned = if last {
            in_flight.remove(&self.video_id)
        } else {
            None
        };
        drop(in_flight);

        if abandoned.is_some() {
            warn!(video_id = %self.video_id, "Every caller left, abandoning run");
        }
    }
}

/// Produces and caches summaries for videos.
#[derive(Clone)]
pub struct SummaryPipeline {
    inner: Arc<PipelineInner>,
}

impl SummaryPipeline {
    /// Build the pipeline from settings: yt-dlp captions, OpenAI summaries and the configured store.
    pub fn from_settings(settings: &Settings) -> crate::error::Result<Self> {
        let prompts = Prompts::load(
            settings.prompts.custom_dir.as_deref(),
            Some(&settings.prompts.variables),
        )?;

        let source = Arc::new(YoutubeCaptionSource::new(&settings.youtube));
        let summarizer = Arc::new(OpenAiSummarizer::new(
            &settings.summarization,
            prompts,
            settings.timeouts.summarize(),
        )?);
        let store = create_store(settings)?;

        Ok(Self::with_components(
            source,
            summarizer,
            store,
            PipelineConfig::from_settings(settings),
        ))
    }

    pub fn with_components(
        source: Arc<dyn CaptionSource>,
        summarizer: Arc<dyn Summarizer>,
        store: Arc<dyn ResultStore>,
        config: PipelineConfig,
    ) -> Self {
        let orchestrator = SummarizationOrchestrator::new(summarizer, config.orchestrator.clone());
        Self {
            inner: Arc::new(PipelineInner {
                source,
                orchestrator,
                store,
                config,
                in_flight: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn store(&self) -> Arc<dyn ResultStore> {
        self.inner.store.clone()
    }

    /// Return the summary for a video, generating and storing it on a cache miss.
    pub async fn generate_summary(&self, video_id: &VideoId) -> RunResult {
        self.generate_summary_with(video_id, GenerateOptions::default())
            .await
    }

    /// Like [`generate_summary`](Self::generate_summary), with options.
    ///
    /// If a run for the same video is already in flight, this call waits for
    /// it instead of starting another one.
    ///
    /// Dropping the returned future leaves the run; when no request is left
    /// waiting, the run is abandoned.
    pub async fn generate_summary_with(&self, video_id: &VideoId, options: GenerateOptions) -> RunResult {
        let (run, _waiter) = {
            let mut in_flight = self.inner.lock_in_flight();
            let entry = in_flight.entry(video_id.clone()).or_insert_with(|| {
                let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
                let inner = self.inner.clone();
                let id = video_id.clone();
                let run = async move {
                    let outcome = inner.run(&id, options).await;
                    inner.finish(&id, generation);
                    outcome
                }
                .boxed()
                .shared();
                InFlightRun {
                    generation,
                    waiters: 0,
                    run,
                }
            });

            entry.waiters += 1;
            if entry.waiters > 1 {
                debug!(video_id = %video_id, waiters = entry.waiters, "Joining in-flight run");
            }
            let waiter = Waiter {
                inner: &self.inner,
                video_id: video_id.clone(),
                generation: entry.generation,
            };
            (entry.run.clone(), waiter)
        };

        run.await
    }
}

impl PipelineInner {
    fn lock_in_flight(&self) -> MutexGuard<'_, HashMap<VideoId, InFlightRun>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Remove a completed run so later requests start from the cache.
    fn finish(&self, video_id: &VideoId, generation: u64) {
        let mut in_flight = self.lock_in_flight();
        if in_flight.get(video_id).is_some_and(|entry| entry.generation == generation) {
            in_flight.remove(video_id);
        }
    }

    async fn run(&self, video_id: &VideoId, options: GenerateOptions) -> RunResult {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", %run_id, video_id = %video_id, force = options.force);

        async {
            let tracker = StageTracker::new();
            let work = self.execute(video_id, &options, run_id, &tracker);

            let outcome = match tokio::time::timeout(self.config.run_timeout, work).await {
                Ok(outcome) => outcome,
                Err(_) => Err(PipelineError::TimedOut {
                    video_id: video_id.clone(),
                    stage: tracker.get(),
                }),
            };

            match &outcome {
                Ok(done) => info!(origin = ?done.origin, stage = %done.stage(), "Run finished"),
                Err(e) => {
                    warn!(stage = %e.stage(), error = %e, "Run failed");
                    tracker.set(RunStage::Failed);
                }
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        video_id: &VideoId,
        options: &GenerateOptions,
        run_id: Uuid,
        tracker: &StageTracker,
    ) -> RunResult {
        let cancel = &options.cancel;
        let cancelled = |stage| PipelineError::Cancelled {
            video_id: video_id.clone(),
            stage,
        };
        let style = options.style.unwrap_or(self.config.style);
        let mut warning = None;

        if !options.force {
            tracker.set(RunStage::CheckingCache);
            match self.store_get(video_id).await {
                Ok(Some(result)) if result.style != style => {
                    debug!(cached = %result.style, requested = %style, "Cached summary has another style");
                }
                Ok(Some(result)) => {
                    tracker.set(RunStage::CacheHit);
                    tracker.set(RunStage::Done);
                    return Ok(SummaryOutcome {
                        result,
                        origin: ResultOrigin::Cache,
                        warning: None,
                    });
                }
                Ok(None) => debug!("Cache miss"),
                Err(e) => {
                    warn!(error = %e, "Cache read failed, generating anew");
                    warning = Some(e);
                }
            }
        }

        tracker.set(RunStage::Acquiring);
        let (metadata, transcript) = self.acquire(video_id, cancel).await.map_err(|failure| match failure {
            Attempted::Cancelled => cancelled(RunStage::Acquiring),
            Attempted::Failed { error, .. } => PipelineError::Acquisition {
                video_id: video_id.clone(),
                source: error,
            },
        })?;
        info!(
            source = self.source.name(),
            title = %metadata.title,
            segments = transcript.segments.len(),
            duration = transcript.duration_seconds(),
            language = transcript.language.as_deref().unwrap_or("unknown"),
            "Captions acquired"
        );

        tracker.set(RunStage::Normalizing);
        let normalized = normalize(&transcript).map_err(|source| PipelineError::Normalization {
            video_id: video_id.clone(),
            source,
        })?;
        let chunks: Vec<Chunk> = normalized.chunks(self.config.max_chunk_chars).collect();
        info!(chars = normalized.char_len(), chunks = chunks.len(), "Transcript normalized");

        if cancel.is_cancelled() {
            return Err(cancelled(RunStage::Normalizing));
        }

        tracker.set(RunStage::Summarizing);
        let draft = self
            .orchestrator
            .summarize(&metadata.title, style, chunks, cancel)
            .await
            .map_err(|source| match source {
                SummarizationError::Cancelled => cancelled(RunStage::Summarizing),
                source => PipelineError::Summarization {
                    video_id: video_id.clone(),
                    source,
                },
            })?;

        // Nothing is written for a cancelled run.
        if cancel.is_cancelled() {
            return Err(cancelled(RunStage::Summarizing));
        }

        let result = SummaryResult {
            video_id: video_id.clone(),
            title: metadata.title,
            channel: metadata.channel,
            duration_seconds: metadata.duration_seconds,
            thumbnail_url: metadata.thumbnail_url,
            view_count: metadata.view_count,
            published_at: metadata.published_at,
            summary_text: draft.summary_text,
            style,
            language: normalized.language().map(str::to_string),
            source_chunk_count: draft.source_chunk_count,
            skipped_chunks: draft.skipped_chunks,
            run_id,
            generated_at: Utc::now(),
        };

        tracker.set(RunStage::Storing);
        if let Err(e) = self.store_put(&result).await {
            warn!(error = %e, "Failed to store summary");
            warning = Some(e);
        }
        tracker.set(if warning.is_some() {
            RunStage::DoneWithWarning
        } else {
            RunStage::Done
        });

        Ok(SummaryOutcome {
            result,
            origin: ResultOrigin::Generated,
            warning,
        })
    }

    /// Fetch metadata and captions, retrying transient failures.
    async fn acquire(
        &self,
        video_id: &VideoId,
        cancel: &CancellationToken,
    ) -> Result<(VideoMetadata, Transcript), Attempted<crate::error::AcquisitionError>> {
        run_with_retry(
            &self.config.acquisition_retry,
            self.config.acquisition_timeout,
            cancel,
            |_| self.source.fetch_video(video_id),
        )
        .await
    }

    async fn store_get(&self, video_id: &VideoId) -> Result<Option<SummaryResult>, StoreError> {
        tokio::time::timeout(self.config.store_timeout, self.store.get(video_id))
            .await
            .unwrap_or_else(|_| Err(StoreError::Unavailable("read timed out".to_string())))
    }

    async fn store_put(&self, result: &SummaryResult) -> Result<(), StoreError> {
        tokio::time::timeout(self.config.store_timeout, self.store.put(result))
            .await
            .unwrap_or_else(|_| Err(StoreError::Unavailable("write timed out".to_string())))
    }
}
