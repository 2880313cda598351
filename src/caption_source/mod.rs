//! Caption source abstraction for Quicktube.
//!
//! Provides a trait-based interface for obtaining a video's captions and metadata.

mod vtt;
mod youtube;

pub use vtt::parse_vtt;
pub use youtube::YoutubeCaptionSource;

use crate::error::AcquisitionError;
use crate::transcript::Transcript;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static BARE_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]{11}$").expect("valid video id regex"));

/// Opaque identifier of a source video.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoId(String);

impl VideoId {
    /// Wrap an identifier as-is.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Extract a YouTube video ID from a URL or a bare 11-character ID.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if BARE_ID_REGEX.is_match(input) {
            return Some(Self(input.to_string()));
        }

        let url = url::Url::parse(input)
            .or_else(|_| url::Url::parse(&format!("https://{}", input)))
            .ok()?;
        let host = url.host_str()?.to_ascii_lowercase();

        let candidate = if host == "youtu.be" {
            url.path_segments()?.next().map(str::to_string)
        } else if host == "youtube.com" || host.ends_with(".youtube.com") {
            let mut segments = url.path_segments()?;
            match segments.next() {
                Some("watch") => url
                    .query_pairs()
                    .find(|(key, _)| key == "v")
                    .map(|(_, value)| value.into_owned()),
                Some("embed") | Some("v") | Some("shorts") | Some("live") => {
                    segments.next().map(str::to_string)
                }
                _ => None,
            }
        } else {
            None
        }?;

        BARE_ID_REGEX
            .is_match(&candidate)
            .then(|| Self(candidate))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Canonical watch URL for this video.
    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.0)
    }
}

impl std::fmt::Display for VideoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Metadata about a video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// Video identifier.
    pub id: VideoId,
    /// Title.
    pub title: String,
    /// Channel or uploader name (if available).
    pub channel: Option<String>,
    /// Duration in seconds (if known).
    pub duration_seconds: Option<u32>,
    /// Thumbnail URL (if available).
    pub thumbnail_url: Option<String>,
    /// View count (if available).
    pub view_count: Option<u64>,
    /// Publication date (if available).
    pub published_at: Option<DateTime<Utc>>,
}

impl VideoMetadata {
    /// Metadata carrying only the identifier and a title.
    pub fn untitled(id: VideoId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            channel: None,
            duration_seconds: None,
            thumbnail_url: None,
            view_count: None,
            published_at: None,
        }
    }
}

/// Trait for caption providers.
#[async_trait]
pub trait CaptionSource: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Fetch metadata for a video.
    async fn fetch_metadata(&self, id: &VideoId) -> Result<VideoMetadata, AcquisitionError>;

    /// Fetch the time-ordered caption segments for a video.
    async fn fetch_transcript(&self, id: &VideoId) -> Result<Transcript, AcquisitionError>;

    /// Fetch metadata and captions together.
    ///
    /// Sources that can answer both from one upstream lookup override this.
    async fn fetch_video(&self, id: &VideoId) -> Result<(VideoMetadata, Transcript), AcquisitionError> {
        futures::try_join!(self.fetch_metadata(id), self.fetch_transcript(id))
    }
}
