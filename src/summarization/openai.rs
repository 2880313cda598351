//! OpenAI chat completion summarizer.

use super::{SummaryRequest, SummaryStage, Summarizer};
use crate::config::{Prompts, SummarizationSettings};
use crate::error::SummarizeFailure;
use crate::openai::create_client_with_timeout;
use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs, FinishReason,
};
use async_openai::Client;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};

/// Summarizer backed by the OpenAI chat completions API.
pub struct OpenAiSummarizer {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    output_language: String,
    prompts: Prompts,
}

impl OpenAiSummarizer {
    /// Create a summarizer whose HTTP requests are bounded by `request_timeout`.
    pub fn new(
        settings: &SummarizationSettings,
        prompts: Prompts,
        request_timeout: Duration,
    ) -> crate::error::Result<Self> {
        let client = create_client_with_timeout(request_timeout)?;
        Ok(Self::with_client(client, settings, prompts))
    }

    pub fn with_client(
        client: Client<OpenAIConfig>,
        settings: &SummarizationSettings,
        prompts: Prompts,
    ) -> Self {
        Self {
            client,
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            output_language: settings.output_language.clone(),
            prompts,
        }
    }

    /// Render the system and user prompts for a request.
    fn render_prompts(&self, request: &SummaryRequest) -> (String, String) {
        let summary = &self.prompts.summary;

        let mut vars = HashMap::new();
        vars.insert("language".to_string(), self.output_language.clone());
        vars.insert("title".to_string(), request.title.clone());
        vars.insert("format".to_string(), summary.format_for(request.style).to_string());

        let template = match request.stage {
            SummaryStage::Chunk { index, total } => {
                vars.insert("part".to_string(), (index + 1).to_string());
                vars.insert("total".to_string(), total.to_string());
                vars.insert("transcript".to_string(), request.text.clone());
                &summary.chunk
            }
            SummaryStage::Merge { .. } => {
                vars.insert("summaries".to_string(), request.text.clone());
                &summary.merge
            }
        };

        (
            self.prompts.render_with_custom(&summary.system, &vars),
            self.prompts.render_with_custom(template, &vars),
        )
    }
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    #[instrument(skip(self, request), fields(stage = ?request.stage, chars = request.text.len()))]
    async fn summarize(&self, request: &SummaryRequest) -> Result<String, SummarizeFailure> {
        let (system, user) = self.render_prompts(request);

        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system)
                .build()
                .map_err(|e| classify_api_error(&e))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user)
                .build()
                .map_err(|e| classify_api_error(&e))?
                .into(),
        ];

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(self.temperature)
            .max_completion_tokens(self.max_tokens)
            .build()
            .map_err(|e| classify_api_error(&e))?;

        let response = self
            .client
            .chat()
            .create(chat_request)
            .await
            .map_err(|e| classify_api_error(&e))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| SummarizeFailure::Permanent("response contained no choices".to_string()))?;

        if choice.finish_reason == Some(FinishReason::ContentFilter) {
            return Err(SummarizeFailure::PolicyRejected(
                "output withheld by the content filter".to_string(),
            ));
        }
        if let Some(refusal) = choice.message.refusal {
            return Err(SummarizeFailure::PolicyRejected(refusal));
        }

        let content = choice
            .message
            .content
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| SummarizeFailure::Permanent("empty response from model".to_string()))?;

        debug!(chars = content.len(), "Received summary");
        Ok(content)
    }
}

const PERMANENT_ERROR_TYPES: &[&str] = &[
    "invalid_request_error",
    "insufficient_quota",
    "authentication_error",
    "permission_error",
    "not_found_error",
];

/// Map an OpenAI client error to a retry class.
pub(crate) fn classify_api_error(err: &OpenAIError) -> SummarizeFailure {
    match err {
        OpenAIError::Reqwest(e) => SummarizeFailure::Transient(format!("request failed: {}", e)),
        OpenAIError::ApiError(api) => {
            let kind = api.r#type.as_deref().unwrap_or("");
            let message = api.message.to_lowercase();

            if kind.contains("content_policy")
                || message.contains("content management policy")
                || message.contains("content_policy")
                || message.contains("safety system")
            {
                SummarizeFailure::PolicyRejected(api.message.clone())
            } else if PERMANENT_ERROR_TYPES.contains(&kind) {
                SummarizeFailure::Permanent(api.message.clone())
            } else {
                // rate_limit_*, server_error and untyped gateway errors
                SummarizeFailure::Transient(api.message.clone())
            }
        }
        OpenAIError::JSONDeserialize(e) => {
            SummarizeFailure::Permanent(format!("malformed response: {}", e))
        }
        OpenAIError::InvalidArgument(msg) => SummarizeFailure::Permanent(msg.clone()),
        other => SummarizeFailure::Transient(other.to_string()),
    }
}
