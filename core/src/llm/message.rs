//! LLM message structures

use serde::{Deserialize, Serialize};

/// Prefix used when a tool result is sent to a provider as plain user text
pub const TOOL_RESULT_PREFIX: &str = "Tool result:";

/// Represents a message in an LLM conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmMessage {
    /// Role of the message sender
    pub role: MessageRole,

    /// Text content of the message
    pub content: String,
}

/// Role of the message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System message (instructions)
    System,

    /// User message (human input)
    User,

    /// Assistant message (AI response)
    Assistant,

    /// Tool message (folded tool outcome)
    Tool,
}

impl LlmMessage {
    /// Create a new system message
    pub fn system<S: Into<String>>(content: S) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// Create a new user message
    pub fn user<S: Into<String>>(content: S) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create a new assistant message
    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    /// Create a new tool message
    pub fn tool<S: Into<String>>(content: S) -> Self {
        Self {
            role: MessageRole::Tool,
            content: content.into(),
        }
    }

    /// Text as seen by providers without a native tool role.
    ///
    /// Tool outcomes travel as user messages, so they get a prefix that keeps
    /// them distinguishable from what the human typed.
    pub fn provider_text(&self) -> String {
        match self.role {
            MessageRole::Tool => format!("{} {}", TOOL_RESULT_PREFIX, self.content),
            _ => self.content.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_message_is_prefixed_for_providers() {
        let message = LlmMessage::tool(r#"{"status":"ok"}"#);
        assert_eq!(message.provider_text(), r#"Tool result: {"status":"ok"}"#);
        assert_eq!(LlmMessage::user("hi").provider_text(), "hi");
    }

    #[test]
    fn test_role_serialization() {
        let json = serde_json::to_string(&LlmMessage::assistant("done")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"done"}"#);
    }
}
