//! Prompt templates for Quicktube.
//!
//! Prompts can be customized by placing a `summary.toml` file in the custom prompts directory.

use super::SummaryStyle;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Collection of all prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Prompts {
    pub summary: SummaryPrompts,
    /// Custom variables from config, available in all prompts.
    #[serde(skip)]
    pub variables: HashMap<String, String>,
}

/// Prompts for chunk and merge summaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryPrompts {
    pub system: String,
    /// User prompt for one transcript chunk.
    pub chunk: String,
    /// User prompt combining partial summaries into one.
    pub merge: String,
    /// Output layout instructions, per style.
    pub structured_format: String,
    pub bullets_format: String,
    pub paragraph_format: String,
}

impl Default for SummaryPrompts {
    fn default() -> Self {
        Self {
            system: r#"You are an expert at summarizing videos from their transcripts.

- Write in {{language}}, whatever the language of the transcript
- Only report what the transcript says; never invent facts, names or figures
- Ignore filler such as greetings, sponsor reads and requests to like or subscribe
- Keep the speaker's own terminology for technical terms"#
                .to_string(),

            chunk: r#"Summarize this part of a video transcript.

Video title: {{title}}
Part {{part}} of {{total}}

TRANSCRIPT:
{{transcript}}

{{format}}"#
                .to_string(),

            merge: r#"The following are summaries of consecutive parts of the same video, in order.
Combine them into a single coherent summary of the whole video. Remove repetition
and keep the order in which topics appear.

Video title: {{title}}

PART SUMMARIES:
{{summaries}}

{{format}}"#
                .to_string(),

            structured_format: r#"FORMAT:
## Main summary
[2-3 sentences]

## Key points
- Point 1
- Point 2
- Point 3

## Main ideas
[Development]

## Conclusion
[Takeaway]"#
                .to_string(),

            bullets_format: "FORMAT: 5-7 bullet points covering the key points.".to_string(),

            paragraph_format: "FORMAT: one flowing paragraph of 4-6 sentences.".to_string(),
        }
    }
}

impl SummaryPrompts {
    /// Layout instructions for the given style.
    pub fn format_for(&self, style: SummaryStyle) -> &str {
        match style {
            SummaryStyle::Structured => &self.structured_format,
            SummaryStyle::Bullets => &self.bullets_format,
            SummaryStyle::Paragraph => &self.paragraph_format,
        }
    }
}

impl Prompts {
    /// Load prompts from the default location, with optional custom directory and variables.
    pub fn load(
        custom_dir: Option<&str>,
        custom_variables: Option<&HashMap<String, String>>,
    ) -> crate::error::Result<Self> {
        let mut prompts = Prompts::default();

        if let Some(vars) = custom_variables {
            prompts.variables = vars.clone();
        }

        if let Some(dir) = custom_dir {
            let custom_path = PathBuf::from(shellexpand::tilde(dir).to_string());

            let summary_path = custom_path.join("summary.toml");
            if summary_path.exists() {
                let content = std::fs::read_to_string(&summary_path)?;
                prompts.summary = toml::from_str(&content)?;
            }
        }

        Ok(prompts)
    }

    /// Render a prompt template with the given variables.
    pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
        let mut result = template.to_string();
        for (key, value) in vars {
            result = result.replace(&format!("{{{{{}}}}}", key), value);
        }
        result
    }

    /// Render a prompt template with both provided variables and custom config variables.
    /// Provided variables take precedence over custom config variables.
    pub fn render_with_custom(&self, template: &str, vars: &HashMap<String, String>) -> String {
        let mut merged = self.variables.clone();
        for (key, value) in vars {
            merged.insert(key.clone(), value.clone());
        }
        Self::render(template, &merged)
    }
}
