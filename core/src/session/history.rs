//! Bounded conversation history

use crate::llm::LlmMessage;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
    /// Output of a tool call, fed back to the model
    ToolResult,
}

/// One entry of the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
}

impl ConversationTurn {
    pub fn user<S: Into<String>>(content: S) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }

    pub fn tool_result<S: Into<String>>(content: S) -> Self {
        Self {
            role: TurnRole::ToolResult,
            content: content.into(),
        }
    }

    pub fn to_message(&self) -> LlmMessage {
        match self.role {
            TurnRole::User => LlmMessage::user(&self.content),
            TurnRole::Assistant => LlmMessage::assistant(&self.content),
            TurnRole::ToolResult => LlmMessage::tool(&self.content),
        }
    }
}

/// FIFO window of turns; pushing past the cap evicts the oldest turns.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    turns: VecDeque<ConversationTurn>,
    cap: usize,
}

impl ConversationHistory {
    /// Create an empty history holding at most `cap` turns (minimum 1)
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            turns: VecDeque::with_capacity(cap),
            cap,
        }
    }

    /// Append a turn, returning how many old turns were evicted
    pub fn push(&mut self, turn: ConversationTurn) -> usize {
        self.turns.push_back(turn);
        let mut evicted = 0;
        while self.turns.len() > self.cap {
            self.turns.pop_front();
            evicted += 1;
        }
        if evicted > 0 {
            tracing::trace!("Evicted {} turn(s) from history", evicted);
        }
        evicted
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&ConversationTurn> {
        self.turns.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    /// Provider messages for the retained turns, oldest first
    pub fn to_messages(&self) -> Vec<LlmMessage> {
        self.turns.iter().map(ConversationTurn::to_message).collect()
    }
}
