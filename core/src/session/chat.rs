//! Conversational dispatch loop

use crate::config::SessionConfig;
use crate::error::{ConnectionError, Error, MalformedToolCall, Result};
use crate::llm::{ChatOptions, LlmClient, LlmMessage};
use crate::mcp::{ToolCatalog, ToolService};
use crate::output::{ChatEvent, ChatOutput, MessageLevel, NullOutput};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

use super::{
    dispatch, extract_tool_call, text_before_marker, ConversationHistory, ConversationTurn,
    PromptBuilder, ToolCallOutcome, ToolCallRequest,
};

/// How a turn was resolved
#[derive(Debug, Clone, PartialEq)]
pub enum TurnState {
    /// The first model response contained no tool call
    PlainAnswer,
    /// One tool call was dispatched and the model answered from its result
    ToolAnswered {
        request: ToolCallRequest,
        outcome: ToolCallOutcome,
    },
    /// The marker was present but the call could not be parsed
    MalformedCall { reason: MalformedToolCall },
}

/// Result of one user turn
#[derive(Debug, Clone, PartialEq)]
pub struct TurnReport {
    pub answer: String,
    pub state: TurnState,
}

/// Builder for [`ChatSession`]
pub struct ChatSessionBuilder {
    llm: Arc<dyn LlmClient>,
    tools: Box<dyn ToolService>,
    config: SessionConfig,
    options: ChatOptions,
    output: Box<dyn ChatOutput>,
}

impl ChatSessionBuilder {
    pub fn new(llm: Arc<dyn LlmClient>, tools: Box<dyn ToolService>) -> Self {
        Self {
            llm,
            tools,
            config: SessionConfig::default(),
            options: ChatOptions::default(),
            output: Box::new(NullOutput),
        }
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_options(mut self, options: ChatOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_output(mut self, output: Box<dyn ChatOutput>) -> Self {
        self.output = output;
        self
    }

    /// Discover tools and render the system prompt.
    ///
    /// The tool service is shut down before any error is returned.
    pub async fn bootstrap(self) -> Result<ChatSession> {
        let Self {
            llm,
            mut tools,
            config,
            options,
            output,
        } = self;

        match Self::prepare(tools.as_mut(), &config).await {
            Ok((catalog, system_prompt)) => {
                tracing::info!("🧰 Discovered {} tools: {}", catalog.len(), catalog.names().join(", "));
                let session = ChatSession {
                    llm,
                    tools,
                    history: ConversationHistory::new(config.history_cap),
                    catalog,
                    system_prompt,
                    config,
                    options,
                    output,
                };
                session
                    .emit(ChatEvent::ToolsDiscovered {
                        tools: session.catalog.iter().cloned().collect(),
                    })
                    .await;
                Ok(session)
            }
            Err(e) => {
                if let Err(shutdown_error) = tools.shutdown().await {
                    tracing::debug!("Tool server shutdown failed: {}", shutdown_error);
                }
                Err(e)
            }
        }
    }

    async fn prepare(
        tools: &mut dyn ToolService,
        config: &SessionConfig,
    ) -> Result<(ToolCatalog, String)> {
        config.validate()?;

        let catalog = ToolCatalog::new(tools.list_tools().await?);
        if catalog.is_empty() {
            return Err(ConnectionError::NoTools.into());
        }

        let system_prompt =
            PromptBuilder::new(config.marker.as_str())?.render(&catalog, config.briefing.as_deref())?;
        Ok((catalog, system_prompt))
    }
}

/// A conversation bound to one model and one tool server
pub struct ChatSession {
    llm: Arc<dyn LlmClient>,
    tools: Box<dyn ToolService>,
    catalog: ToolCatalog,
    system_prompt: String,
    history: ConversationHistory,
    config: SessionConfig,
    options: ChatOptions,
    output: Box<dyn ChatOutput>,
}

impl ChatSession {
    pub fn builder(llm: Arc<dyn LlmClient>, tools: Box<dyn ToolService>) -> ChatSessionBuilder {
        ChatSessionBuilder::new(llm, tools)
    }

    /// Bootstrap with default model options
    pub async fn bootstrap(
        llm: Arc<dyn LlmClient>,
        tools: Box<dyn ToolService>,
        config: SessionConfig,
        output: Box<dyn ChatOutput>,
    ) -> Result<Self> {
        ChatSessionBuilder::new(llm, tools)
            .with_config(config)
            .with_output(output)
            .bootstrap()
            .await
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn model_name(&self) -> &str {
        self.llm.model_name()
    }

    /// Run one user turn: at most one tool call, then a final answer.
    ///
    /// On error the history is left exactly as it was before the turn. A
    /// lost tool server connection only fails the current turn.
    pub async fn process_turn(&mut self, user_text: &str) -> Result<TurnReport> {
        let mut working = self.history.clone();
        let mut evicted = working.push(ConversationTurn::user(user_text));

        let first = self.complete(&working).await?;

        let report = match extract_tool_call(&first, &self.config.marker) {
            Ok(None) => {
                evicted += working.push(ConversationTurn::assistant(first.as_str()));
                TurnReport {
                    answer: first,
                    state: TurnState::PlainAnswer,
                }
            }
            Ok(Some(request)) => {
                evicted += working.push(ConversationTurn::assistant(first.as_str()));

                let outcome = match self.dispatch_with_events(&request).await {
                    Ok(outcome) => outcome,
                    Err(Error::Connection(e)) => {
                        self.notify(
                            MessageLevel::Warning,
                            &format!("Tool server unavailable, turn aborted: {}", e),
                        )
                        .await;
                        return Err(e.into());
                    }
                    Err(e) => return Err(e),
                };
                evicted += working.push(ConversationTurn::tool_result(
                    outcome.to_turn_text(&request.tool_name),
                ));

                // The follow-up response is final even if it carries another marker
                let answer = self.complete(&working).await?;
                evicted += working.push(ConversationTurn::assistant(answer.as_str()));
                TurnReport {
                    answer,
                    state: TurnState::ToolAnswered { request, outcome },
                }
            }
            Err(reason) => {
                tracing::warn!("Malformed tool call from model: {}", reason);
                self.emit(ChatEvent::MalformedToolCall {
                    reason: reason.to_string(),
                })
                .await;

                evicted += working.push(ConversationTurn::assistant(first.as_str()));
                evicted += working.push(ConversationTurn::tool_result(format!(
                    "tool call rejected: {}. Use the exact format {} {{\"tool_name\": ..., \"arguments\": {{...}}}} or answer directly.",
                    reason, self.config.marker
                )));

                let prose = text_before_marker(&first, &self.config.marker);
                let answer = if prose.is_empty() {
                    format!(
                        "I tried to query the database but my tool request was malformed ({}). Please ask again.",
                        reason
                    )
                } else {
                    prose.to_string()
                };
                TurnReport {
                    answer,
                    state: TurnState::MalformedCall { reason },
                }
            }
        };

        self.history = working;
        if evicted > 0 {
            self.notify(
                MessageLevel::Debug,
                &format!(
                    "Dropped {} oldest turn(s) to stay within {} turns of history",
                    evicted,
                    self.history.cap()
                ),
            )
            .await;
        }
        self.emit(ChatEvent::Answer {
            text: report.answer.clone(),
        })
        .await;
        Ok(report)
    }

    /// Dispatch a tool directly, bypassing the model
    pub async fn run_tool(&mut self, name: &str, arguments: Value) -> Result<ToolCallOutcome> {
        let request = ToolCallRequest::from_value(name, arguments)?;
        self.dispatch_with_events(&request).await
    }

    /// Release the tool server connection
    pub async fn shutdown(mut self) -> Result<()> {
        tracing::debug!("Shutting down chat session");
        self.tools.shutdown().await
    }

    async fn dispatch_with_events(&mut self, request: &ToolCallRequest) -> Result<ToolCallOutcome> {
        let call_id = uuid::Uuid::new_v4().to_string();
        self.emit(ChatEvent::ToolCallStarted {
            call_id: call_id.clone(),
            request: request.clone(),
        })
        .await;

        let started = Instant::now();
        let outcome = dispatch(&self.catalog, self.tools.as_mut(), request).await?;

        self.emit(ChatEvent::ToolCallCompleted {
            call_id,
            request: request.clone(),
            outcome: outcome.clone(),
            duration: started.elapsed(),
        })
        .await;
        Ok(outcome)
    }

    async fn complete(&self, history: &ConversationHistory) -> Result<String> {
        self.emit(ChatEvent::Thinking).await;

        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(LlmMessage::system(self.system_prompt.as_str()));
        messages.extend(history.to_messages());

        let response = self
            .llm
            .chat_completion(messages, Some(self.options.clone()))
            .await?;

        if let Some(usage) = &response.usage {
            tracing::debug!("Turn used {} tokens", usage.total_tokens);
        }
        Ok(response.content)
    }

    async fn emit(&self, event: ChatEvent) {
        if let Err(e) = self.output.emit_event(event).await {
            tracing::debug!("Failed to emit chat event: {}", e);
        }
    }

    async fn notify(&self, level: MessageLevel, content: &str) {
        if let Err(e) = self.output.emit_message(level, content).await {
            tracing::debug!("Failed to emit chat message: {}", e);
        }
    }
}
