//! Anthropic Claude client implementation

use crate::config::ResolvedLlmConfig;
use crate::error::{LlmError, Result};
use crate::llm::{ChatOptions, FinishReason, LlmClient, LlmMessage, LlmResponse, MessageRole, Usage};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Claude client
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    headers: HashMap<String, String>,
}

impl AnthropicClient {
    /// Create a new Anthropic client
    pub fn new(config: &ResolvedLlmConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(LlmError::Authentication {
                message: "No API key found for Anthropic".to_string(),
            }
            .into());
        }

        Ok(Self {
            client: Client::new(),
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            headers: config.headers.clone(),
        })
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn chat_completion(
        &self,
        messages: Vec<LlmMessage>,
        options: Option<ChatOptions>,
    ) -> Result<LlmResponse> {
        let request = self.build_request(messages, options);

        let mut builder = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json");
        for (key, value) in &self.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        let response = builder
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Network {
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("Anthropic API returned {}: {}", status, error_text);
            return Err(LlmError::from_status(status, error_text).into());
        }

        let anthropic_response: AnthropicResponse =
            response.json().await.map_err(|e| LlmError::Network {
                message: format!("Failed to parse response: {}", e),
            })?;

        Ok(self.convert_response(anthropic_response))
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        "anthropic"
    }
}

impl AnthropicClient {
    fn build_request(&self, messages: Vec<LlmMessage>, options: Option<ChatOptions>) -> AnthropicRequest {
        let options = options.unwrap_or_default();

        // The Messages API takes the system prompt separately and requires
        // user/assistant alternation, so adjacent same-side turns are merged.
        let mut system_parts = Vec::new();
        let mut conversation: Vec<AnthropicMessage> = Vec::new();

        for message in messages {
            let role = match message.role {
                MessageRole::System => {
                    system_parts.push(message.content);
                    continue;
                }
                MessageRole::User | MessageRole::Tool => "user",
                MessageRole::Assistant => "assistant",
            };
            // History eviction can leave an assistant turn at the front; the
            // API requires the first message to come from the user.
            if conversation.is_empty() && role == "assistant" {
                continue;
            }
            let text = message.provider_text();

            match conversation.last_mut() {
                Some(last) if last.role == role => {
                    last.content.push_str("\n\n");
                    last.content.push_str(&text);
                }
                _ => conversation.push(AnthropicMessage {
                    role,
                    content: text,
                }),
            }
        }

        AnthropicRequest {
            model: self.model.clone(),
            max_tokens: options.max_tokens.unwrap_or(1000),
            temperature: options.temperature,
            top_p: options.top_p,
            system: if system_parts.is_empty() {
                None
            } else {
                Some(system_parts.join("\n\n"))
            },
            messages: conversation,
        }
    }

    fn convert_response(&self, response: AnthropicResponse) -> LlmResponse {
        let content = response
            .content
            .iter()
            .filter(|block| block.content_type == "text")
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n");

        let usage = response.usage.map(|u| Usage {
            prompt_tokens: u.input_tokens,
            completion_tokens: u.output_tokens,
            total_tokens: u.input_tokens + u.output_tokens,
        });

        let finish_reason = response.stop_reason.map(|reason| match reason.as_str() {
            "end_turn" | "stop_sequence" => FinishReason::Stop,
            "max_tokens" => FinishReason::Length,
            _ => FinishReason::Other(reason),
        });

        LlmResponse {
            content,
            usage,
            model: response.model,
            finish_reason,
        }
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    model: String,
    content: Vec<AnthropicContent>,
    stop_reason: Option<String>,
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Protocol;
    use serde_json::json;

    fn client() -> AnthropicClient {
        AnthropicClient::new(&ResolvedLlmConfig::new(
            Protocol::Anthropic,
            "https://api.anthropic.com/".to_string(),
            "sk-ant-test".to_string(),
            "claude-3-5-sonnet-20241022".to_string(),
        ))
        .unwrap()
    }

    #[test]
    fn test_request_merges_tool_result_into_user_turn() {
        let request = client().build_request(
            vec![
                LlmMessage::system("schema briefing"),
                LlmMessage::user("count validators"),
                LlmMessage::assistant("TOOL_CALL: {}"),
                LlmMessage::tool("[42]"),
                LlmMessage::user("and slashed ones?"),
            ],
            None,
        );

        assert_eq!(request.system.as_deref(), Some("schema briefing"));
        assert_eq!(request.messages.len(), 3);
        assert_eq!(request.messages[2].role, "user");
        assert_eq!(
            request.messages[2].content,
            "Tool result: [42]\n\nand slashed ones?"
        );
        assert_eq!(request.max_tokens, 1000);
    }

    #[test]
    fn test_leading_assistant_turn_dropped() {
        let request = client().build_request(
            vec![
                LlmMessage::assistant("left over from an evicted turn"),
                LlmMessage::user("hello"),
            ],
            None,
        );
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].role, "user");
    }

    #[test]
    fn test_response_text_blocks_are_joined() {
        let response: AnthropicResponse = serde_json::from_value(json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "model": "claude-3-5-sonnet-20241022",
            "content": [
                {"type": "text", "text": "There are"},
                {"type": "text", "text": "42 validators."}
            ],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 10, "output_tokens": 5}
        }))
        .unwrap();

        let converted = client().convert_response(response);
        assert_eq!(converted.content, "There are\n42 validators.");
        assert_eq!(converted.finish_reason, Some(FinishReason::Stop));
        assert_eq!(converted.usage.unwrap().total_tokens, 15);
    }
}
