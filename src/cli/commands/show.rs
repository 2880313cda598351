//! Show command implementation.

use super::parse_video_id;
use crate::cli::Output;
use crate::config::Settings;
use crate::store::create_store;
use anyhow::Result;

/// Run the show command.
pub async fn run_show(input: &str, settings: Settings) -> Result<()> {
    let video_id = parse_video_id(input)?;
    let store = create_store(&settings)?;

    match store.get(&video_id).await? {
        Some(result) => Output::summary(&result),
        None => Output::info(&format!(
            "No summary stored for {}. Use 'quicktube summarize {}' to create one.",
            video_id, video_id
        )),
    }

    Ok(())
}
