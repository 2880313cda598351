//! Error types for Quicktube.
//!
//! Each pipeline stage has its own classified error so callers can decide
//! what to retry and what to surface. All stage errors are `Clone` because a
//! coalesced run hands the same outcome to every waiter, and none of them
//! carry raw upstream payloads.

use crate::caption_source::VideoId;
use crate::pipeline::RunStage;
use thiserror::Error;

/// Failure to obtain captions or metadata for a video.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionError {
    #[error("video not found or unavailable")]
    NotFound,

    #[error("captions are disabled or unavailable for this video")]
    CaptionsDisabled,

    #[error("caption source temporarily unavailable: {0}")]
    Transient(String),

    #[error("unsupported caption payload: {0}")]
    Unsupported(String),

    #[error("caption tool unavailable: {0}")]
    ToolUnavailable(String),
}

impl AcquisitionError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, AcquisitionError::Transient(_))
    }
}

/// Failure to turn a transcript into summarizable text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizationError {
    #[error("transcript is empty after cleaning")]
    EmptyInput,
}

/// Classified failure of a single summarization call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SummarizeFailure {
    #[error("transient summarization failure: {0}")]
    Transient(String),

    #[error("summarization request rejected: {0}")]
    Permanent(String),

    #[error("summarization blocked by content policy: {0}")]
    PolicyRejected(String),
}

impl SummarizeFailure {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, SummarizeFailure::Transient(_))
    }
}

/// Failure of the map-reduce summarization of a whole transcript.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SummarizationError {
    #[error("{failed} of {total} chunk summaries failed, above the tolerated share")]
    ExcessiveFailures { failed: usize, total: usize },

    #[error("merging chunk summaries was rejected: {0}")]
    PermanentRejection(String),

    #[error("merging chunk summaries failed after retries: {0}")]
    MergeFailed(String),

    #[error("summarization cancelled")]
    Cancelled,
}

/// Failure of the persistent result store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("result store unavailable: {0}")]
    Unavailable(String),

    #[error("stored result could not be decoded: {0}")]
    Corrupt(String),
}

/// Terminal failure of a pipeline run, with the video and stage it reached.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("could not acquire captions for {video_id}: {source}")]
    Acquisition {
        video_id: VideoId,
        source: AcquisitionError,
    },

    #[error("could not prepare transcript for {video_id}: {source}")]
    Normalization {
        video_id: VideoId,
        source: NormalizationError,
    },

    #[error("could not summarize {video_id}: {source}")]
    Summarization {
        video_id: VideoId,
        source: SummarizationError,
    },

    #[error("run for {video_id} was cancelled while {stage}")]
    Cancelled { video_id: VideoId, stage: RunStage },

    #[error("run for {video_id} timed out while {stage}")]
    TimedOut { video_id: VideoId, stage: RunStage },
}

impl PipelineError {
    /// The video this run was for.
    pub fn video_id(&self) -> &VideoId {
        match self {
            PipelineError::Acquisition { video_id, .. }
            | PipelineError::Normalization { video_id, .. }
            | PipelineError::Summarization { video_id, .. }
            | PipelineError::Cancelled { video_id, .. }
            | PipelineError::TimedOut { video_id, .. } => video_id,
        }
    }

    /// The stage the run had reached when it failed.
    pub fn stage(&self) -> RunStage {
        match self {
            PipelineError::Acquisition { .. } => RunStage::Acquiring,
            PipelineError::Normalization { .. } => RunStage::Normalizing,
            PipelineError::Summarization { .. } => RunStage::Summarizing,
            PipelineError::Cancelled { stage, .. } | PipelineError::TimedOut { stage, .. } => *stage,
        }
    }
}

/// Library-level error type for setup and CLI operations.
#[derive(Error, Debug)]
pub enum QuicktubeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("External tool not found: {0}. Please install it and ensure it's in your PATH.")]
    ToolNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias for Quicktube operations.
pub type Result<T> = std::result::Result<T, QuicktubeError>;
