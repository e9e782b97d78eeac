//! Configuration types for querybridge core
//!
//! Core only accepts fully resolved, validated configuration.
//! All discovery, loading, and merging happens in CLI layer.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Marker the model is told to put in front of a tool call
pub const DEFAULT_TOOL_CALL_MARKER: &str = "TOOL_CALL:";

/// Default number of turns kept in the conversation window
pub const DEFAULT_HISTORY_CAP: usize = 20;

/// Supported LLM protocols
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    /// OpenAI-compatible API (OpenAI, Groq, most proxies and local servers)
    #[serde(rename = "openai_compat")]
    OpenAICompat,
    /// Anthropic Messages API
    #[serde(rename = "anthropic")]
    Anthropic,
}

impl Protocol {
    /// Get the protocol name as a string
    pub fn as_str(&self) -> &str {
        match self {
            Protocol::OpenAICompat => "openai_compat",
            Protocol::Anthropic => "anthropic",
        }
    }

    /// Get the default base URL for this protocol
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Protocol::OpenAICompat => "https://api.openai.com/v1",
            Protocol::Anthropic => "https://api.anthropic.com",
        }
    }

    /// Highest sampling temperature the provider accepts
    pub fn max_temperature(&self) -> f32 {
        match self {
            Protocol::OpenAICompat => 2.0,
            Protocol::Anthropic => 1.0,
        }
    }
}

impl std::str::FromStr for Protocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" | "openai_compat" | "groq" => Ok(Protocol::OpenAICompat),
            "anthropic" => Ok(Protocol::Anthropic),
            other => Err(ConfigError::InvalidValue {
                field: "protocol".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Model parameters for LLM requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelParams {
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
    /// Temperature for sampling
    pub temperature: Option<f32>,
    /// Top-p sampling parameter
    pub top_p: Option<f32>,
}

impl Default for ModelParams {
    fn default() -> Self {
        // Low temperature keeps generated SQL stable between runs.
        Self {
            max_tokens: Some(1000),
            temperature: Some(0.1),
            top_p: None,
        }
    }
}

/// A fully resolved LLM configuration ready for use by core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedLlmConfig {
    /// The protocol to use
    pub protocol: Protocol,
    /// Base URL for the API
    pub base_url: String,
    /// API key for authentication
    pub api_key: String,
    /// Model name/identifier
    pub model: String,
    /// Model parameters
    #[serde(default)]
    pub params: ModelParams,
    /// Additional headers for requests
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl ResolvedLlmConfig {
    /// Create a new resolved LLM config
    pub fn new(protocol: Protocol, base_url: String, api_key: String, model: String) -> Self {
        Self {
            protocol,
            base_url,
            api_key,
            model,
            params: ModelParams::default(),
            headers: HashMap::new(),
        }
    }

    /// Set model parameters
    pub fn with_params(mut self, params: ModelParams) -> Self {
        self.params = params;
        self
    }

    /// Add multiple headers
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "api_key".to_string(),
            });
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "model".to_string(),
            });
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                field: "base_url".to_string(),
                value: self.base_url.clone(),
            });
        }

        if let Some(temp) = self.params.temperature {
            if !(0.0..=self.protocol.max_temperature()).contains(&temp) {
                return Err(ConfigError::InvalidValue {
                    field: "params.temperature".to_string(),
                    value: temp.to_string(),
                });
            }
        }

        if let Some(top_p) = self.params.top_p {
            if !(0.0..=1.0).contains(&top_p) {
                return Err(ConfigError::InvalidValue {
                    field: "params.top_p".to_string(),
                    value: top_p.to_string(),
                });
            }
        }

        Ok(())
    }
}

/// How to launch the MCP tool server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolServerConfig {
    /// Program and leading arguments
    pub command: Vec<String>,
    /// Extra environment for the server process
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Pass this process' environment through (database credentials live there)
    #[serde(default = "default_true")]
    pub inherit_env: bool,
    /// Bound on spawn + initialize handshake
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_secs: u64,
    /// Bound on a single tools/call round-trip
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_startup_timeout() -> u64 {
    30
}

fn default_call_timeout() -> u64 {
    60
}

impl Default for ToolServerConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "python".to_string(),
                "-m".to_string(),
                "mcp_clickhouse.main".to_string(),
            ],
            env: BTreeMap::new(),
            inherit_env: true,
            startup_timeout_secs: default_startup_timeout(),
            call_timeout_secs: default_call_timeout(),
        }
    }
}

impl ToolServerConfig {
    /// Create a config for the given command line
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            ..Default::default()
        }
    }

    /// Human readable command line, for logs and error messages
    pub fn display_command(&self) -> String {
        self.command.join(" ")
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.command.first().map_or(true, |c| c.trim().is_empty()) {
            return Err(ConfigError::MissingField {
                field: "tool_server.command".to_string(),
            });
        }
        if self.startup_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "tool_server.startup_timeout_secs".to_string(),
                value: "0".to_string(),
            });
        }
        if self.call_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "tool_server.call_timeout_secs".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

/// Conversation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Maximum number of turns kept in history
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,
    /// Literal that introduces a tool call in model output
    #[serde(default = "default_marker")]
    pub marker: String,
    /// Domain briefing embedded in the system prompt; built-in one when unset
    #[serde(default)]
    pub briefing: Option<String>,
}

fn default_history_cap() -> usize {
    DEFAULT_HISTORY_CAP
}

fn default_marker() -> String {
    DEFAULT_TOOL_CALL_MARKER.to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_cap: DEFAULT_HISTORY_CAP,
            marker: default_marker(),
            briefing: None,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_cap == 0 {
            return Err(ConfigError::InvalidValue {
                field: "history_cap".to_string(),
                value: "0".to_string(),
            });
        }
        if self.marker.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "marker".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn llm_config() -> ResolvedLlmConfig {
        ResolvedLlmConfig::new(
            Protocol::OpenAICompat,
            "https://api.groq.com/openai/v1".to_string(),
            "gsk-test".to_string(),
            "llama-3.1-70b-versatile".to_string(),
        )
    }

    #[test]
    fn test_valid_llm_config() {
        assert!(llm_config().validate().is_ok());
    }

    #[test]
    fn test_empty_api_key_rejected() {
        let mut config = llm_config();
        config.api_key = "  ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingField { field }) if field == "api_key"
        ));
    }

    #[test]
    fn test_bad_base_url_rejected() {
        let mut config = llm_config();
        config.base_url = "api.groq.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_temperature_range() {
        let mut config = llm_config();
        config.params.temperature = Some(3.5);
        assert!(config.validate().is_err());

        config.params.temperature = Some(1.5);
        assert!(config.validate().is_ok());

        config.protocol = Protocol::Anthropic;
        config.base_url = Protocol::Anthropic.default_base_url().to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "params.temperature"
        ));

        config.params.temperature = Some(1.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_protocol_parsing() {
        assert_eq!("groq".parse::<Protocol>().unwrap(), Protocol::OpenAICompat);
        assert_eq!("Anthropic".parse::<Protocol>().unwrap(), Protocol::Anthropic);
        assert!("carrier-pigeon".parse::<Protocol>().is_err());
    }

    #[test]
    fn test_tool_server_defaults() {
        let config = ToolServerConfig::default();
        assert_eq!(config.display_command(), "python -m mcp_clickhouse.main");
        assert!(config.inherit_env);
        assert!(config.validate().is_ok());
        assert!(ToolServerConfig::new(Vec::new()).validate().is_err());
    }

    #[test]
    fn test_session_config_from_partial_json() {
        let config: SessionConfig = serde_json::from_str(r#"{"history_cap": 6}"#).unwrap();
        assert_eq!(config.history_cap, 6);
        assert_eq!(config.marker, DEFAULT_TOOL_CALL_MARKER);

        let zero: SessionConfig = serde_json::from_str(r#"{"history_cap": 0}"#).unwrap();
        assert!(zero.validate().is_err());
    }
}
