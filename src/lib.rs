//! Quicktube - YouTube video summaries from captions
//!
//! A library and CLI that turns a YouTube video's captions into a condensed,
//! LLM-generated summary and keeps it for reuse.
//!
//! # Overview
//!
//! A summary request goes through a read-through cache: a stored summary is
//! returned as is, otherwise the pipeline fetches the captions, cleans and
//! chunks the transcript, summarizes the chunks concurrently (map) and merges
//! the partial summaries in order (reduce), then stores the result.
//!
//! # Architecture
//!
//! - `config` - Settings and prompt templates
//! - `caption_source` - Caption and metadata acquisition (yt-dlp)
//! - `transcript` - Transcript data types
//! - `chunking` - Transcript normalization and chunking
//! - `retry` - Retry state machine with exponential backoff
//! - `summarization` - Model calls and the map-reduce orchestrator
//! - `store` - Summary persistence (SQLite, in-memory)
//! - `pipeline` - Run state machine, caching, coalescing, timeouts
//!
//! # Example
//!
//! ```rust,no_run
//! use quicktube::caption_source::VideoId;
//! use quicktube::config::Settings;
//! use quicktube::pipeline::SummaryPipeline;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let pipeline = SummaryPipeline::from_settings(&settings)?;
//!
//!     let video_id = VideoId::parse("https://youtu.be/dQw4w9WgXcQ").expect("valid id");
//!     let outcome = pipeline.generate_summary(&video_id).await?;
//!     println!("{}", outcome.result.summary_text);
//!
//!     Ok(())
//! }
//! ```

pub mod caption_source;
pub mod chunking;
pub mod cli;
pub mod config;
pub mod error;
pub mod openai;
pub mod pipeline;
pub mod retry;
pub mod store;
pub mod summarization;
pub mod transcript;

pub use error::{QuicktubeError, Result};
