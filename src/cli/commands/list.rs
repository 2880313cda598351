//! List command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::store::create_store;
use anyhow::Result;

/// Run the list command.
pub async fn run_list(settings: Settings) -> Result<()> {
    let store = create_store(&settings)?;

    match store.list().await {
        Ok(results) => {
            if results.is_empty() {
                Output::info("No summaries stored yet. Use 'quicktube summarize <url>' to add one.");
            } else {
                Output::header(&format!("Stored Summaries ({})", results.len()));
                println!();

                for result in &results {
                    Output::summary_line(result);
                }

                let partial = results.iter().filter(|r| !r.is_complete()).count();
                println!();
                Output::kv("Total summaries", &results.len().to_string());
                if partial > 0 {
                    Output::kv("Partial summaries", &partial.to_string());
                }
            }
        }
        Err(e) => {
            Output::error(&format!("Failed to list summaries: {}", e));
            return Err(e.into());
        }
    }

    Ok(())
}
