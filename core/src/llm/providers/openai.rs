//! OpenAI-compatible client implementation using async-openai library
//!
//! Covers OpenAI itself and any endpoint speaking the same chat completions
//! API, which is how Groq-hosted models are reached.

use crate::config::ResolvedLlmConfig;
use crate::error::{LlmError, Result};
use crate::llm::{ChatOptions, FinishReason, LlmClient, LlmMessage, LlmResponse, MessageRole, Usage};
use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessage, ChatCompletionRequestAssistantMessageContent,
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
        ChatCompletionRequestUserMessage, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

/// OpenAI-compatible client using async-openai library
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiClient {
    /// Create a new client from resolved LLM config
    pub fn new(config: &ResolvedLlmConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(LlmError::Authentication {
                message: "No API key configured".to_string(),
            }
            .into());
        }

        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.api_key)
            .with_api_base(config.base_url.trim_end_matches('/'));

        let mut client = Client::with_config(openai_config);

        if !config.headers.is_empty() {
            let mut headers = HeaderMap::new();
            for (key, value) in &config.headers {
                let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
                    LlmError::InvalidRequest {
                        message: format!("Invalid header name '{}': {}", key, e),
                    }
                })?;
                let value = HeaderValue::from_str(value).map_err(|e| LlmError::InvalidRequest {
                    message: format!("Invalid value for header '{}': {}", key, e),
                })?;
                headers.insert(name, value);
            }
            let http_client = reqwest::Client::builder()
                .default_headers(headers)
                .build()?;
            client = client.with_http_client(http_client);
        }

        Ok(Self {
            client,
            model: config.model.clone(),
        })
    }

    /// Convert our internal message format to async-openai format
    fn convert_messages(&self, messages: Vec<LlmMessage>) -> Vec<ChatCompletionRequestMessage> {
        messages
            .into_iter()
            .map(|message| match message.role {
                MessageRole::System => {
                    ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                        content: message.content.into(),
                        name: None,
                    })
                }
                MessageRole::User | MessageRole::Tool => {
                    ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                        content: message.provider_text().into(),
                        name: None,
                    })
                }
                MessageRole::Assistant => {
                    ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
                        content: Some(ChatCompletionRequestAssistantMessageContent::Text(
                            message.content,
                        )),
                        name: None,
                        tool_calls: None,
                        audio: None,
                        refusal: None,
                        ..Default::default()
                    })
                }
            })
            .collect()
    }

    /// Map an async-openai error onto the provider-neutral error kinds
    fn convert_error(error: OpenAIError) -> LlmError {
        match error {
            OpenAIError::ApiError(api) => {
                let kind = format!(
                    "{} {}",
                    api.r#type.as_deref().unwrap_or_default(),
                    api.message
                )
                .to_lowercase()
                .replace('_', " ");
                if kind.contains("rate limit") {
                    LlmError::RateLimit {
                        message: api.message,
                    }
                } else if kind.contains("api key") || kind.contains("auth") {
                    LlmError::Authentication {
                        message: api.message,
                    }
                } else {
                    // async-openai doesn't expose status codes directly
                    LlmError::ApiError {
                        status: 500,
                        message: api.message,
                    }
                }
            }
            OpenAIError::Reqwest(e) => LlmError::Network {
                message: e.to_string(),
            },
            other => LlmError::ApiError {
                status: 500,
                message: other.to_string(),
            },
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn chat_completion(
        &self,
        messages: Vec<LlmMessage>,
        options: Option<ChatOptions>,
    ) -> Result<LlmResponse> {
        let message_count = messages.len();
        let converted_messages = self.convert_messages(messages);

        let mut request_builder = CreateChatCompletionRequestArgs::default();
        request_builder.model(&self.model);
        request_builder.messages(converted_messages);

        if let Some(opts) = options {
            if let Some(max_tokens) = opts.max_tokens {
                request_builder.max_tokens(max_tokens);
            }
            if let Some(temperature) = opts.temperature {
                request_builder.temperature(temperature);
            }
            if let Some(top_p) = opts.top_p {
                request_builder.top_p(top_p);
            }
        }

        let request = request_builder.build().map_err(|e| {
            tracing::error!("Failed to build chat request: {}", e);
            LlmError::InvalidRequest {
                message: format!("Failed to build request: {}", e),
            }
        })?;

        tracing::debug!(
            "Sending {} messages to {} ({})",
            message_count,
            self.model,
            self.provider_name()
        );

        let response = self.client.chat().create(request).await.map_err(|e| {
            tracing::error!("Chat completion call failed: {}", e);
            Self::convert_error(e)
        })?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or(LlmError::EmptyResponse)?;

        let content = choice.message.content.unwrap_or_default();

        let finish_reason = choice.finish_reason.map(|reason| match reason {
            async_openai::types::FinishReason::Stop => FinishReason::Stop,
            async_openai::types::FinishReason::Length => FinishReason::Length,
            async_openai::types::FinishReason::ContentFilter => FinishReason::ContentFilter,
            other => FinishReason::Other(format!("{:?}", other)),
        });

        let usage = response.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        if let Some(usage) = &usage {
            tracing::debug!(
                "Token usage: prompt={}, completion={}",
                usage.prompt_tokens,
                usage.completion_tokens
            );
        }

        Ok(LlmResponse {
            content,
            usage,
            model: response.model,
            finish_reason,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        "openai_compat"
    }
}
