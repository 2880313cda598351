//! Summarization of transcript chunks through a language model.
//!
//! A `Summarizer` performs one model call. The `SummarizationOrchestrator`
//! fans calls out over the chunks of a transcript and reduces the partial
//! summaries into one.

mod openai;
mod orchestrator;

pub use openai::OpenAiSummarizer;
pub use orchestrator::{OrchestratorConfig, SummarizationOrchestrator, SummaryDraft};

use crate::config::SummaryStyle;
use crate::error::SummarizeFailure;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What a summarization call is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SummaryStage {
    /// Summarize chunk `index` (0-based) of `total`.
    Chunk { index: usize, total: usize },
    /// Combine `parts` ordered partial summaries into one.
    Merge { parts: usize },
}

/// Input to a single summarization call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRequest {
    /// Transcript text, or the numbered partial summaries for a merge.
    pub text: String,
    /// Video title, given to the model as context.
    pub title: String,
    /// Layout the summary is written in.
    pub style: SummaryStyle,
    pub stage: SummaryStage,
}

/// Trait for language model summarizers.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize the request text. Makes exactly one upstream call, no retries.
    async fn summarize(&self, request: &SummaryRequest) -> Result<String, SummarizeFailure>;
}
