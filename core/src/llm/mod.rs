//! LLM client abstractions and implementations

pub mod client;
pub mod message;
pub mod providers;

pub use client::{ChatOptions, FinishReason, LlmClient, LlmResponse, Usage};
pub use message::{LlmMessage, MessageRole, TOOL_RESULT_PREFIX};
pub use providers::*;
