//! Chat sessions: prompt assembly, tool-call extraction, dispatch and history

pub mod chat;
pub mod dispatch;
pub mod extract;
pub mod history;
pub mod prompt;

pub use chat::{ChatSession, ChatSessionBuilder, TurnReport, TurnState};
pub use dispatch::{dispatch, ToolCallOutcome};
pub use extract::{extract_tool_call, text_before_marker, ToolCallRequest};
pub use history::{ConversationHistory, ConversationTurn, TurnRole};
pub use prompt::{PromptBuilder, DEFAULT_BRIEFING};
