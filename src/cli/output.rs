//! CLI output formatting utilities.

use crate::store::SummaryResult;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Output helper for CLI formatting.
pub struct Output;

impl Output {
    /// Print an info message.
    pub fn info(msg: &str) {
        println!("{} {}", style(">>").cyan().bold(), msg);
    }

    /// Print a success message.
    pub fn success(msg: &str) {
        println!("{} {}", style(">>").green().bold(), msg);
    }

    /// Print a warning message.
    pub fn warning(msg: &str) {
        eprintln!("{} {}", style(">>").yellow().bold(), msg);
    }

    /// Print an error message.
    pub fn error(msg: &str) {
        eprintln!("{} {}", style(">>").red().bold(), msg);
    }

    /// Print a header.
    pub fn header(msg: &str) {
        println!("\n{}", style(msg).bold().underlined());
    }

    /// Print a key-value pair.
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", style(key).dim(), value);
    }

    /// Print a full summary with its details.
    pub fn summary(result: &SummaryResult) {
        Output::header(&result.title);
        Output::kv("Video", &result.video_id.watch_url());
        if let Some(channel) = &result.channel {
            Output::kv("Channel", channel);
        }
        if let Some(seconds) = result.duration_seconds {
            Output::kv("Duration", &format_duration(seconds));
        }
        if let Some(views) = result.view_count {
            Output::kv("Views", &views.to_string());
        }
        if let Some(published) = result.published_at {
            Output::kv("Published", &published.format("%Y-%m-%d").to_string());
        }
        Output::kv("Style", &result.style.to_string());
        if let Some(language) = &result.language {
            Output::kv("Captions", language);
        }
        Output::kv("Generated", &result.generated_at.format("%Y-%m-%d %H:%M UTC").to_string());
        Output::kv("Chunks", &coverage(result));
        println!("\n{}\n", result.summary_text);
    }

    /// Print one line describing a stored summary.
    pub fn summary_line(result: &SummaryResult) {
        println!(
            "  {} {} ({}, {}, {})",
            style("*").cyan(),
            style(&result.title).bold(),
            style(result.video_id.as_str()).dim(),
            coverage(result),
            result.generated_at.format("%Y-%m-%d"),
        );
    }

    /// Create a spinner.
    pub fn spinner(msg: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }
}

/// "1:02:03" or "4:05".
fn format_duration(seconds: u32) -> String {
    let (h, m, s) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}

/// "3 chunks" or "3 of 4 chunks" when some were skipped.
fn coverage(result: &SummaryResult) -> String {
    if result.is_complete() {
        format!("{} chunks", result.source_chunk_count)
    } else {
        format!(
            "{} of {} chunks",
            result.source_chunk_count,
            result.source_chunk_count + result.skipped_chunks.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::sample_result;

    #[test]
    fn test_coverage() {
        let mut result = sample_result("abc123");
        assert_eq!(coverage(&result), "3 of 4 chunks");

        result.skipped_chunks.clear();
        assert_eq!(coverage(&result), "3 chunks");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(245), "4:05");
        assert_eq!(format_duration(3723), "1:02:03");
    }
}
