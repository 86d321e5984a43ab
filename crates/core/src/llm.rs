//! Chat-completion client for generating tutoring replies.

use crate::error::ServiceError;
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;

/// Sampling temperature for tutoring replies.
const REPLY_TEMPERATURE: f32 = 0.7;
/// Upper bound on reply length; tutoring turns are short.
const REPLY_MAX_TOKENS: u32 = 700;

/// A generic client for the language-model service.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Produces a single tutoring reply for `user_text` under `system_prompt`.
    async fn complete(
        &self,
        system_prompt: &str,
        user_text: &str,
    ) -> Result<String, ServiceError>;
}

/// An implementation of `LanguageModel` for any OpenAI-compatible API.
pub struct OpenAICompatibleModel {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAICompatibleModel {
    /// Creates a new client for an OpenAI-compatible service.
    ///
    /// # Arguments
    ///
    /// * `config` - The configuration for the OpenAI client, including API key and base URL.
    /// * `model` - The specific model identifier to use for chat completions (e.g., "gpt-4o-mini").
    pub fn new(config: OpenAIConfig, model: String) -> Self {
        Self {
            client: Client::with_config(config),
            model,
        }
    }
}

#[async_trait]
impl LanguageModel for OpenAICompatibleModel {
    async fn complete(
        &self,
        system_prompt: &str,
        user_text: &str,
    ) -> Result<String, ServiceError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system_prompt)
                    .build()
                    .map_err(|e| ServiceError::Model(e.to_string()))?
                    .into(),
                ChatCompletionRequestUserMessageArgs::default()
                    .content(user_text)
                    .build()
                    .map_err(|e| ServiceError::Model(e.to_string()))?
                    .into(),
            ])
            .temperature(REPLY_TEMPERATURE)
            .max_completion_tokens(REPLY_MAX_TOKENS)
            .build()
            .map_err(|e| ServiceError::Model(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| ServiceError::Model(e.to_string()))?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| ServiceError::Model("completion had no text content".to_string()))
    }
}

/// A canned `LanguageModel` for development and integration testing.
///
/// Returns a fixed reply for any input, which keeps tests deterministic and
/// avoids external dependencies or API costs.
pub struct MockLanguageModel {
    reply: String,
}

impl MockLanguageModel {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
        }
    }
}

#[async_trait]
impl LanguageModel for MockLanguageModel {
    async fn complete(
        &self,
        _system_prompt: &str,
        _user_text: &str,
    ) -> Result<String, ServiceError> {
        Ok(self.reply.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_model_returns_canned_reply() {
        let model = MockLanguageModel::new("🇩🇪 Hallo! 🇺🇸 Hello!");
        let reply = model.complete("system", "Hallo").await.unwrap();
        assert_eq!(reply, "🇩🇪 Hallo! 🇺🇸 Hello!");
    }
}
