//! Output abstraction for chat sessions
//!
//! Core only emits events; rendering them (terminal, logs, tests) is up to
//! the caller.

use crate::mcp::ToolDescriptor;
use crate::session::{ToolCallOutcome, ToolCallRequest};
use async_trait::async_trait;

/// Events emitted while a session runs
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// The tool server finished discovery
    ToolsDiscovered { tools: Vec<ToolDescriptor> },
    /// A model call is in flight
    Thinking,
    /// A tool call is about to be dispatched
    ToolCallStarted {
        call_id: String,
        request: ToolCallRequest,
    },
    /// A tool call finished, successfully or not
    ToolCallCompleted {
        call_id: String,
        request: ToolCallRequest,
        outcome: ToolCallOutcome,
        duration: std::time::Duration,
    },
    /// The model wrote the marker but the call could not be parsed
    MalformedToolCall { reason: String },
    /// Final answer of a turn
    Answer { text: String },
    /// Diagnostic text
    Message { level: MessageLevel, content: String },
}

/// Message severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLevel {
    Debug,
    Warning,
}

/// Abstract output interface for chat sessions
#[async_trait]
pub trait ChatOutput: Send + Sync {
    /// Emit a session event
    async fn emit_event(
        &self,
        event: ChatEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Emit a diagnostic message
    async fn emit_message(
        &self,
        level: MessageLevel,
        content: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.emit_event(ChatEvent::Message {
            level,
            content: content.to_string(),
        })
        .await
    }
}

/// Output handler that discards all events
pub struct NullOutput;

#[async_trait]
impl ChatOutput for NullOutput {
    async fn emit_event(
        &self,
        _event: ChatEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
}
