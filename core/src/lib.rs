//! # querybridge Core
//!
//! Core library for querybridge, a natural-language front end for database
//! tool servers.
//!
//! A [`ChatSession`] forwards user questions to a hosted model, extracts the
//! `TOOL_CALL:` requests the model writes, runs them against an MCP tool
//! server and feeds the results back for a final answer.

pub mod config;
pub mod error;
pub mod llm;
pub mod mcp;
pub mod output;
pub mod session;

// Re-export commonly used types
pub use config::{ModelParams, Protocol, ResolvedLlmConfig, SessionConfig, ToolServerConfig};
pub use error::{Error, Result};
pub use llm::{create_client, LlmClient};
pub use mcp::{McpStdioClient, ToolCatalog, ToolDescriptor, ToolService};
pub use output::{ChatEvent, ChatOutput, NullOutput};
pub use session::{ChatSession, ChatSessionBuilder, ToolCallOutcome, ToolCallRequest, TurnReport, TurnState};

/// Current version of the querybridge-core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
