//! CLI output handler implementation

use async_trait::async_trait;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use querybridge_core::output::{ChatEvent, ChatOutput, MessageLevel};
use querybridge_core::{ToolCallOutcome, ToolCallRequest};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Longest tool payload echoed to the terminal in debug mode
const MAX_PAYLOAD_PREVIEW: usize = 400;

/// CLI output configuration
#[derive(Debug, Clone)]
pub struct CliOutputConfig {
    /// Whether to show debug messages and tool payloads
    pub show_debug: bool,
    /// Whether to animate a spinner while waiting
    pub show_spinner: bool,
}

impl Default for CliOutputConfig {
    fn default() -> Self {
        Self {
            show_debug: false,
            show_spinner: true,
        }
    }
}

/// Terminal renderer for chat events.
///
/// Clones share the spinner, so the command loop can clear it after a failed turn.
#[derive(Clone)]
pub struct CliOutputHandler {
    config: CliOutputConfig,
    spinner: Arc<Mutex<Option<ProgressBar>>>,
}

impl CliOutputHandler {
    pub fn new(config: CliOutputConfig) -> Self {
        Self {
            config,
            spinner: Arc::new(Mutex::new(None)),
        }
    }

    fn start_spinner(&self, message: String) {
        if !self.config.show_spinner {
            return;
        }
        let Ok(mut slot) = self.spinner.lock() else {
            return;
        };
        match slot.as_ref() {
            Some(spinner) => spinner.set_message(message),
            None => {
                let spinner = ProgressBar::new_spinner();
                spinner.set_style(
                    ProgressStyle::with_template("{spinner:.cyan} {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                spinner.set_message(message);
                spinner.enable_steady_tick(Duration::from_millis(100));
                *slot = Some(spinner);
            }
        }
    }

    /// Remove the spinner line, if any
    pub fn stop_spinner(&self) {
        if let Ok(mut slot) = self.spinner.lock() {
            if let Some(spinner) = slot.take() {
                spinner.finish_and_clear();
            }
        }
    }

    fn format_call(request: &ToolCallRequest) -> String {
        format!("{}({})", request.tool_name, request.arguments_value())
    }

    fn print_outcome(&self, request: &ToolCallRequest, outcome: &ToolCallOutcome, duration: Duration) {
        if outcome.ok {
            println!(
                "   {} {} {}",
                style("✅").green(),
                style(&request.tool_name).bold(),
                style(format!("({:.2}s)", duration.as_secs_f64())).dim()
            );
            if self.config.show_debug {
                let text = outcome.to_turn_text(&request.tool_name);
                println!("{}", style(preview(&text, MAX_PAYLOAD_PREVIEW)).dim());
            }
        } else {
            println!(
                "   {} {} failed: {}",
                style("❌").red(),
                style(&request.tool_name).bold(),
                outcome.error_message.as_deref().unwrap_or("unknown error")
            );
        }
    }
}

impl Default for CliOutputHandler {
    fn default() -> Self {
        Self::new(CliOutputConfig::default())
    }
}

#[async_trait]
impl ChatOutput for CliOutputHandler {
    async fn emit_event(
        &self,
        event: ChatEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        match event {
            ChatEvent::ToolsDiscovered { tools } => {
                if self.config.show_debug {
                    for tool in &tools {
                        println!("   📦 {}", style(tool.signature()).cyan());
                    }
                }
            }

            ChatEvent::Thinking => {
                self.start_spinner("Thinking...".to_string());
            }

            ChatEvent::ToolCallStarted { request, .. } => {
                self.stop_spinner();
                println!(
                    "🔨 {}",
                    style(Self::format_call(&request)).yellow()
                );
                self.start_spinner(format!("Running {}...", request.tool_name));
            }

            ChatEvent::ToolCallCompleted {
                request,
                outcome,
                duration,
                ..
            } => {
                self.stop_spinner();
                self.print_outcome(&request, &outcome, duration);
            }

            ChatEvent::MalformedToolCall { reason } => {
                self.stop_spinner();
                println!(
                    "{} {}",
                    style("⚠️  Could not read the model's tool call:").yellow(),
                    reason
                );
            }

            ChatEvent::Answer { text } => {
                self.stop_spinner();
                println!("\n{} {}\n", style("🤖").bold(), text.trim());
            }

            ChatEvent::Message { level, content } => match level {
                MessageLevel::Debug if self.config.show_debug => {
                    self.stop_spinner();
                    println!("🐛 {}", style(content).dim());
                }
                MessageLevel::Debug => {}
                MessageLevel::Warning => {
                    self.stop_spinner();
                    println!("{} {}", style("⚠️  Warning:").yellow(), content);
                }
            },
        }

        Ok(())
    }
}

/// First `max` characters of `text`, marking truncation
fn preview(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
