//! CLI command implementations.

mod config;
mod list;
mod show;
mod summarize;

pub use config::run_config;
pub use list::run_list;
pub use show::run_show;
pub use summarize::run_summarize;

use crate::caption_source::VideoId;
use crate::error::QuicktubeError;

/// Parse a command-line video reference.
fn parse_video_id(input: &str) -> Result<VideoId, QuicktubeError> {
    VideoId::parse(input).ok_or_else(|| {
        QuicktubeError::InvalidInput(format!("Invalid YouTube video ID or URL: {}", input))
    })
}
