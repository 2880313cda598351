//! Map-reduce summarization of a chunked transcript.

use super::{SummaryRequest, SummaryStage, Summarizer};
use crate::chunking::Chunk;
use crate::config::{Settings, SummaryStyle};
use crate::error::{SummarizationError, SummarizeFailure};
use crate::retry::{run_with_retry, Attempted, RetryPolicy};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Characters added around each partial summary when building merge input.
const PART_OVERHEAD_CHARS: usize = 16;

/// Tuning for a summarization run.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum summarization calls in flight at once.
    pub max_concurrent: usize,
    /// Largest share of chunks allowed to fail.
    pub failure_tolerance: f64,
    /// Character budget for the text of one merge call.
    pub merge_budget_chars: usize,
    /// Merge rounds before the remaining summaries are merged in one call regardless of size.
    pub max_merge_rounds: usize,
    pub retry: RetryPolicy,
    /// Limit for one summarization attempt.
    pub call_timeout: Duration,
}

impl OrchestratorConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_concurrent: settings.summarization.max_concurrent.max(1),
            failure_tolerance: settings.summarization.failure_tolerance,
            merge_budget_chars: settings.chunking.max_chunk_chars,
            max_merge_rounds: 3,
            retry: RetryPolicy::from_settings(&settings.retry),
            call_timeout: settings.timeouts.summarize(),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// Outcome of a successful summarization run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryDraft {
    pub summary_text: String,
    /// Chunks whose summary made it into the result.
    pub source_chunk_count: usize,
    /// Indices of chunks whose summary failed but was tolerated.
    pub skipped_chunks: Vec<usize>,
}

/// Drives chunk summaries concurrently, then merges them in order.
pub struct SummarizationOrchestrator {
    summarizer: Arc<dyn Summarizer>,
    config: OrchestratorConfig,
}

impl SummarizationOrchestrator {
    pub fn new(summarizer: Arc<dyn Summarizer>, config: OrchestratorConfig) -> Self {
        Self { summarizer, config }
    }

    /// Summarize all chunks and reduce them to one summary.
    #[instrument(skip(self, chunks, cancel), fields(chunks = chunks.len()))]
    pub async fn summarize(
        &self,
        title: &str,
        style: SummaryStyle,
        chunks: Vec<Chunk>,
        cancel: &CancellationToken,
    ) -> Result<SummaryDraft, SummarizationError> {
        let total = chunks.len();
        info!("Summarizing {} chunks ({} concurrent)", total, self.config.max_concurrent);

        let mut outcomes: Vec<(usize, Result<String, Attempted<SummarizeFailure>>)> =
            stream::iter(chunks.into_iter().map(|chunk| {
                let index = chunk.sequence_index;
                let request = SummaryRequest {
                    text: chunk.text,
                    title: title.to_string(),
                    style,
                    stage: SummaryStage::Chunk { index, total },
                };
                async move { (index, self.call(request, cancel).await) }
            }))
            .buffer_unordered(self.config.max_concurrent)
            .collect()
            .await;

        // Completion order is arbitrary; merge input must follow the transcript.
        outcomes.sort_by_key(|(index, _)| *index);

        let mut summaries = Vec::with_capacity(total);
        let mut skipped_chunks = Vec::new();
        for (index, outcome) in outcomes {
            match outcome {
                Ok(summary) => summaries.push(summary),
                Err(Attempted::Cancelled) => return Err(SummarizationError::Cancelled),
                Err(Attempted::Failed { error, attempts }) => {
                    warn!(chunk = index, attempts, error = %error, "Chunk summary failed");
                    skipped_chunks.push(index);
                }
            }
        }

        let failed = skipped_chunks.len();
        if summaries.is_empty() || failed > self.allowed_failures(total) {
            return Err(SummarizationError::ExcessiveFailures { failed, total });
        }
        if failed > 0 {
            warn!("Continuing without {} of {} chunks", failed, total);
        }

        let source_chunk_count = summaries.len();
        let summary_text = self.reduce(title, style, summaries, cancel).await?;

        Ok(SummaryDraft {
            summary_text,
            source_chunk_count,
            skipped_chunks,
        })
    }

    /// Failures tolerated out of `total` chunks.
    fn allowed_failures(&self, total: usize) -> usize {
        (self.config.failure_tolerance.clamp(0.0, 1.0) * total as f64).floor() as usize
    }

    async fn call(
        &self,
        request: SummaryRequest,
        cancel: &CancellationToken,
    ) -> Result<String, Attempted<SummarizeFailure>> {
        let request = &request;
        run_with_retry(&self.config.retry, self.config.call_timeout, cancel, |_| {
            self.summarizer.summarize(request)
        })
        .await
    }

    /// Merge ordered partial summaries until one remains.
    async fn reduce(
        &self,
        title: &str,
        style: SummaryStyle,
        mut summaries: Vec<String>,
        cancel: &CancellationToken,
    ) -> Result<String, SummarizationError> {
        let mut round = 0;

        while summaries.len() > 1 {
            round += 1;
            let mut groups = group_for_merge(summaries, self.config.merge_budget_chars);
            if round >= self.config.max_merge_rounds || groups.iter().all(|g| g.len() == 1) {
                groups = vec![groups.into_iter().flatten().collect()];
            }
            debug!(round, groups = groups.len(), "Merging partial summaries");

            summaries = stream::iter(groups.into_iter().map(|group| self.merge_group(title, style, group, cancel)))
                .buffered(self.config.max_concurrent)
                .try_collect()
                .await?;
        }

        summaries
            .pop()
            .ok_or_else(|| SummarizationError::MergeFailed("no summaries to merge".to_string()))
    }

    async fn merge_group(
        &self,
        title: &str,
        style: SummaryStyle,
        group: Vec<String>,
        cancel: &CancellationToken,
    ) -> Result<String, SummarizationError> {
        if group.len() == 1 {
            return Ok(group.into_iter().next().unwrap_or_default());
        }

        let request = SummaryRequest {
            text: format_parts(&group),
            title: title.to_string(),
            style,
            stage: SummaryStage::Merge { parts: group.len() },
        };

        self.call(request, cancel).await.map_err(|failure| match failure {
            Attempted::Cancelled => SummarizationError::Cancelled,
            Attempted::Failed { error, .. } if error.is_transient() => {
                SummarizationError::MergeFailed(error.to_string())
            }
            Attempted::Failed { error, .. } => SummarizationError::PermanentRejection(error.to_string()),
        })
    }
}

/// Number the partial summaries for a merge prompt.
fn format_parts(parts: &[String]) -> String {
    parts
        .iter()
        .enumerate()
        .map(|(i, part)| format!("[Part {}]\n{}", i + 1, part))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Split ordered summaries into consecutive groups that fit the budget.
fn group_for_merge(summaries: Vec<String>, budget: usize) -> Vec<Vec<String>> {
    let mut groups: Vec<Vec<String>> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_len = 0;

    for summary in summaries {
        let len = summary.chars().count() + PART_OVERHEAD_CHARS;
        if !current.is_empty() && current_len + len > budget {
            groups.push(std::mem::take(&mut current));
            current_len = 0;
        }
        current_len += len;
        current.push(summary);
    }
    if !current.is_empty() {
        groups.push(current);
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Echoes chunk indices; merges wrap their input. Later chunks finish first.
    struct ScriptedSummarizer {
        failing: HashSet<usize>,
        failure: SummarizeFailure,
        merge_failure: Option<SummarizeFailure>,
        requests: Mutex<Vec<SummaryRequest>>,
    }

    impl ScriptedSummarizer {
        fn new() -> Self {
            Self {
                failing: HashSet::new(),
                failure: SummarizeFailure::Permanent("rejected".into()),
                merge_failure: None,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn failing(mut self, indices: &[usize]) -> Self {
            self.failing = indices.iter().copied().collect();
            self
        }

        fn merges(&self) -> Vec<SummaryRequest> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .filter(|r| matches!(r.stage, SummaryStage::Merge { .. }))
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl Summarizer for ScriptedSummarizer {
        async fn summarize(&self, request: &SummaryRequest) -> Result<String, SummarizeFailure> {
            self.requests.lock().unwrap().push(request.clone());
            match request.stage {
                SummaryStage::Chunk { index, total } => {
                    let delay = (total - index) as u64 * 10;
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    if self.failing.contains(&index) {
                        Err(self.failure.clone())
                    } else {
                        Ok(format!("S{}", index))
                    }
                }
                SummaryStage::Merge { .. } => match &self.merge_failure {
                    Some(failure) => Err(failure.clone()),
                    None => Ok(format!("M({})", request.text.replace('\n', " "))),
                },
            }
        }
    }

    fn chunks(n: usize) -> Vec<Chunk> {
        (0..n)
            .map(|i| Chunk {
                sequence_index: i,
                text: format!("chunk {}", i),
            })
            .collect()
    }

    fn config() -> OrchestratorConfig {
        OrchestratorConfig {
            max_concurrent: 4,
            failure_tolerance: 0.5,
            merge_budget_chars: 10_000,
            max_merge_rounds: 3,
            retry: RetryPolicy::new(2, Duration::from_millis(10), Duration::from_millis(10)),
            call_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_chunk_passes_through() {
        let summarizer = Arc::new(ScriptedSummarizer::new());
        let orchestrator = SummarizationOrchestrator::new(summarizer.clone(), config());

        let draft = orchestrator
            .summarize("t", SummaryStyle::default(), chunks(1), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(draft.summary_text, "S0");
        assert_eq!(draft.source_chunk_count, 1);
        assert!(summarizer.merges().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_merge_input_is_ordered_despite_completion_order() {
        let summarizer = Arc::new(ScriptedSummarizer::new());
        let orchestrator = SummarizationOrchestrator::new(summarizer.clone(), config());

        let draft = orchestrator
            .summarize("t", SummaryStyle::default(), chunks(4), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            draft.summary_text,
            "M([Part 1] S0  [Part 2] S1  [Part 3] S2  [Part 4] S3)"
        );
        assert_eq!(draft.source_chunk_count, 4);
        assert_eq!(summarizer.merges().len(), 1);
        assert_eq!(summarizer.merges()[0].stage, SummaryStage::Merge { parts: 4 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_tolerated_failures_are_skipped() {
        let summarizer = Arc::new(ScriptedSummarizer::new().failing(&[1]));
        let orchestrator = SummarizationOrchestrator::new(summarizer, config());

        let draft = orchestrator
            .summarize("t", SummaryStyle::default(), chunks(4), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(draft.source_chunk_count, 3);
        assert_eq!(draft.skipped_chunks, vec![1]);
        assert!(draft.summary_text.contains("S2"));
        assert!(!draft.summary_text.contains("S1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_excessive_failures() {
        let summarizer = Arc::new(ScriptedSummarizer::new().failing(&[0, 1, 3]));
        let orchestrator = SummarizationOrchestrator::new(summarizer, config());

        let err = orchestrator
            .summarize("t", SummaryStyle::default(), chunks(4), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, SummarizationError::ExcessiveFailures { failed: 3, total: 4 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_at_the_tolerance_limit_are_accepted() {
        // floor(0.5 * 4) = 2 failures allowed, a third one fails the run.
        let summarizer = Arc::new(ScriptedSummarizer::new().failing(&[0, 3]));
        let orchestrator = SummarizationOrchestrator::new(summarizer, config());

        let draft = orchestrator
            .summarize("t", SummaryStyle::default(), chunks(4), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(draft.source_chunk_count, 2);
        assert_eq!(draft.skipped_chunks, vec![0, 3]);

        let mut config = config();
        config.failure_tolerance = 0.25;
        let summarizer = Arc::new(ScriptedSummarizer::new().failing(&[0, 3]));
        let orchestrator = SummarizationOrchestrator::new(summarizer, config);

        let err = orchestrator
            .summarize("t", SummaryStyle::default(), chunks(4), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, SummarizationError::ExcessiveFailures { failed: 2, total: 4 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_style_reaches_every_call() {
        let summarizer = Arc::new(ScriptedSummarizer::new());
        let orchestrator = SummarizationOrchestrator::new(summarizer.clone(), config());

        orchestrator
            .summarize("t", SummaryStyle::Bullets, chunks(3), &CancellationToken::new())
            .await
            .unwrap();

        let requests = summarizer.requests.lock().unwrap();
        assert_eq!(requests.len(), 4);
        assert!(requests.iter().all(|r| r.style == SummaryStyle::Bullets));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_chunk_failure_is_excessive() {
        let summarizer = Arc::new(ScriptedSummarizer::new().failing(&[0]));
        let orchestrator = SummarizationOrchestrator::new(summarizer, config());

        let err = orchestrator
            .summarize("t", SummaryStyle::default(), chunks(1), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, SummarizationError::ExcessiveFailures { failed: 1, total: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_chunk_failures_are_retried() {
        let mut summarizer = ScriptedSummarizer::new().failing(&[0]);
        summarizer.failure = SummarizeFailure::Transient("503".into());
        let summarizer = Arc::new(summarizer);
        let orchestrator = SummarizationOrchestrator::new(summarizer.clone(), config());

        let draft = orchestrator
            .summarize("t", SummaryStyle::default(), chunks(2), &CancellationToken::new())
            .await
            .unwrap();

        let chunk0_calls = summarizer
            .requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.stage == SummaryStage::Chunk { index: 0, total: 2 })
            .count();
        assert_eq!(chunk0_calls, 2);
        assert_eq!(draft.skipped_chunks, vec![0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_merge_failures_are_classified() {
        let mut summarizer = ScriptedSummarizer::new();
        summarizer.merge_failure = Some(SummarizeFailure::PolicyRejected("filtered".into()));
        let orchestrator = SummarizationOrchestrator::new(Arc::new(summarizer), config());
        let err = orchestrator
            .summarize("t", SummaryStyle::default(), chunks(2), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SummarizationError::PermanentRejection(_)));

        let mut summarizer = ScriptedSummarizer::new();
        summarizer.merge_failure = Some(SummarizeFailure::Transient("timeout".into()));
        let orchestrator = SummarizationOrchestrator::new(Arc::new(summarizer), config());
        let err = orchestrator
            .summarize("t", SummaryStyle::default(), chunks(2), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SummarizationError::MergeFailed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hierarchical_merge_when_summaries_overflow() {
        let summarizer = Arc::new(ScriptedSummarizer::new());
        let mut config = config();
        // Two partial summaries per merge call
        config.merge_budget_chars = 2 * (2 + PART_OVERHEAD_CHARS);
        let orchestrator = SummarizationOrchestrator::new(summarizer.clone(), config);

        let draft = orchestrator
            .summarize("t", SummaryStyle::default(), chunks(4), &CancellationToken::new())
            .await
            .unwrap();

        let merges = summarizer.merges();
        assert_eq!(merges.len(), 3);
        assert!(draft.summary_text.starts_with("M([Part 1] M([Part 1] S0  [Part 2] S1)"));
        assert!(draft.summary_text.ends_with("[Part 2] M([Part 1] S2  [Part 2] S3))"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation() {
        let summarizer = Arc::new(ScriptedSummarizer::new());
        let orchestrator = SummarizationOrchestrator::new(summarizer, config());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = orchestrator.summarize("t", SummaryStyle::default(), chunks(3), &cancel).await.unwrap_err();
        assert_eq!(err, SummarizationError::Cancelled);
    }

    #[test]
    fn test_group_for_merge_keeps_order() {
        let summaries: Vec<String> = ["aaaa", "bb", "cccccc", "d"].iter().map(|s| s.to_string()).collect();
        let groups = group_for_merge(summaries, 6 + 2 * PART_OVERHEAD_CHARS);
        assert_eq!(
            groups,
            vec![
                vec!["aaaa".to_string(), "bb".to_string()],
                vec!["cccccc".to_string()],
                vec!["d".to_string()],
            ]
        );
    }
}
