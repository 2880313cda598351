//! Configuration module for Quicktube.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{Prompts, SummaryPrompts};
pub use settings::{
    ChunkingSettings, GeneralSettings, PromptSettings, RetrySettings, Settings, StoreProvider,
    StoreSettings, SummarizationSettings, SummaryStyle, TimeoutSettings, YoutubeSettings,
};
