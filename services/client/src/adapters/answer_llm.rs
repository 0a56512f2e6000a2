//! services/client/src/adapters/answer_llm.rs
//!
//! This module contains the adapter for the fitness-answer LLM.
//! It implements the `AnswerService` port from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs},
    Client,
};
use async_trait::async_trait;
use fitqa_core::ports::{AnswerService, PortError, PortResult};
use tracing::{debug, error};

const PROMPT_TEMPLATE: &str =
    "Please provide a concise fitness/health answer to this question (max 200 words): {question}";

/// Roughly 200 words.
const MAX_TOKENS: u32 = 300;

const EMPTY_ANSWER: &str = "No response received.";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `AnswerService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiAnswerAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiAnswerAdapter {
    /// Creates a new `OpenAiAnswerAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

fn build_prompt(question: &str) -> String {
    PROMPT_TEMPLATE.replace("{question}", question)
}

const FALLBACK_ERROR: &str = "Failed to get AI response. Please check your API key.";

/// Prefers the provider's own explanation, which usually names the real problem
/// (bad key, quota, unknown model).
fn describe_error(error: OpenAIError) -> PortError {
    error!("AI provider request failed: {}", error);
    match error {
        OpenAIError::ApiError(api) if !api.message.trim().is_empty() => {
            PortError::Provider(api.message)
        }
        _ => PortError::Provider(FALLBACK_ERROR.to_string()),
    }
}

//=========================================================================================
// `AnswerService` Trait Implementation
//=========================================================================================

#[async_trait]
impl AnswerService for OpenAiAnswerAdapter {
    async fn answer(&self, question: &str) -> PortResult<String> {
        let messages = vec![ChatCompletionRequestUserMessageArgs::default()
            .content(build_prompt(question))
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .into()];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(0.7)
            .max_tokens(MAX_TOKENS)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(describe_error)?;

        let answer = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_else(|| EMPTY_ANSWER.to_string());
        debug!(chars = answer.len(), "AI answer received");

        Ok(answer)
    }
}
