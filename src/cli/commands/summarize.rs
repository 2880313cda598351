//! Summarize command implementation.

use super::parse_video_id;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::{Settings, SummaryStyle};
use crate::error::{AcquisitionError, PipelineError};
use crate::pipeline::{GenerateOptions, ResultOrigin, SummaryPipeline};
use anyhow::Result;
use tokio_util::sync::CancellationToken;

/// Run the summarize command.
pub async fn run_summarize(input: &str, force: bool, style: Option<SummaryStyle>, settings: Settings) -> Result<()> {
    let video_id = parse_video_id(input)?;

    if let Err(e) = preflight::check(Operation::Summarize, &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let pipeline = SummaryPipeline::from_settings(&settings)?;

    // Ctrl-C cancels the run instead of killing the process mid-write.
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let spinner = Output::spinner(&format!("Summarizing {}", video_id.watch_url()));
    let options = GenerateOptions {
        force,
        cancel,
        style,
    };
    let outcome = pipeline.generate_summary_with(&video_id, options).await;
    spinner.finish_and_clear();
    interrupt.abort();

    match outcome {
        Ok(outcome) => {
            Output::summary(&outcome.result);

            if !outcome.result.is_complete() {
                Output::warning(&format!(
                    "Parts of the transcript could not be summarized (chunks {:?}); the summary is partial.",
                    outcome.result.skipped_chunks
                ));
            }
            if let Some(warning) = &outcome.warning {
                Output::warning(&format!("Summary was produced but the store reported: {}", warning));
            }
            if outcome.origin == ResultOrigin::Cache {
                Output::info("Served from the store. Use --force to regenerate.");
            } else {
                Output::success(&format!("Summarized '{}'", outcome.result.title));
            }
            Ok(())
        }
        Err(e) => {
            Output::error(&e.to_string());
            if let Some(hint) = hint_for(&e) {
                Output::info(hint);
            }
            Err(e.into())
        }
    }
}

fn hint_for(error: &PipelineError) -> Option<&'static str> {
    match error {
        PipelineError::Acquisition {
            source: AcquisitionError::ToolUnavailable(_),
            ..
        } => Some("Install yt-dlp (https://github.com/yt-dlp/yt-dlp) or set youtube.ytdlp_path."),
        PipelineError::Acquisition {
            source: AcquisitionError::Transient(_),
            ..
        } => Some("YouTube may be rate limiting requests; try again later or set youtube.cookies_path."),
        PipelineError::TimedOut { .. } => Some("Raise timeouts.run_secs for very long videos."),
        _ => None,
    }
}
