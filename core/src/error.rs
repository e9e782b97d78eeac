//! Error types and handling for querybridge core

use thiserror::Error;

/// Result type alias for querybridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for querybridge core
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The tool server could not be reached or stopped answering
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// The model emitted a tool call that could not be extracted
    #[error("Malformed tool call: {0}")]
    MalformedToolCall(#[from] MalformedToolCall),

    /// The tool server reported a failure for a call
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    /// Upstream model provider errors
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Prompt template errors
    #[error("Template error: {0}")]
    Template(String),
}

impl Error {
    /// Whether this error should end the interactive session rather than
    /// just the current turn. A connection failure during a turn only fails
    /// that turn.
    pub fn is_fatal_for_session(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for field '{field}': {value}")]
    InvalidValue { field: String, value: String },
}

/// Errors reaching the tool server
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Tool server command not found: {command}")]
    CommandNotFound { command: String },

    #[error("Failed to start tool server '{command}': {message}")]
    Spawn { command: String, message: String },

    #[error("Tool server handshake timed out after {seconds}s")]
    HandshakeTimeout { seconds: u64 },

    #[error("Tool server handshake failed: {message}")]
    Handshake { message: String },

    #[error("Tool server closed the connection")]
    Closed,

    #[error("Tool server reported no tools; check the server configuration")]
    NoTools,
}

/// Reasons a `TOOL_CALL:` block could not be turned into a request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedToolCall {
    #[error("no JSON object follows the tool call marker")]
    MissingObject,

    #[error("tool call JSON is truncated (unbalanced braces)")]
    Truncated,

    #[error("tool call is not valid JSON: {message}")]
    InvalidJson { message: String },

    #[error("tool call is missing the '{field}' field")]
    MissingField { field: String },

    #[error("tool call field '{field}' must be {expected}")]
    WrongType { field: String, expected: String },
}

/// Tool execution errors
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Tool execution failed: {name} - {message}")]
    ExecutionFailed { name: String, message: String },

    #[error("Tool '{name}' timed out after {seconds}s")]
    Timeout { name: String, seconds: u64 },

    #[error("Unexpected tool server reply: {message}")]
    Protocol { message: String },
}

/// LLM client errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    #[error("Rate limit exceeded: {message}")]
    RateLimit { message: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Model returned an empty response")]
    EmptyResponse,
}

impl LlmError {
    /// Classify an HTTP status returned by a provider
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => LlmError::Authentication { message },
            429 => LlmError::RateLimit { message },
            _ => LlmError::ApiError { status, message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            LlmError::from_status(401, "bad key".into()),
            LlmError::Authentication { .. }
        ));
        assert!(matches!(
            LlmError::from_status(429, "slow down".into()),
            LlmError::RateLimit { .. }
        ));
        assert!(matches!(
            LlmError::from_status(500, "boom".into()),
            LlmError::ApiError { status: 500, .. }
        ));
    }

    #[test]
    fn test_only_config_errors_end_the_session() {
        assert!(Error::from(ConfigError::MissingField {
            field: "api_key".into()
        })
        .is_fatal_for_session());
        assert!(!Error::from(ConnectionError::Closed).is_fatal_for_session());
        assert!(!Error::from(LlmError::EmptyResponse).is_fatal_for_session());
        assert!(!Error::from(MalformedToolCall::Truncated).is_fatal_for_session());
    }
}
