//! Interactive chat command

use crate::config::CliConfigLoader;
use crate::output::{CliOutputConfig, CliOutputHandler};
use anyhow::Result;
use console::style;
use querybridge_core::ChatSession;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::info;

use super::start_session;

/// Words that end the session
const EXIT_WORDS: [&str; 3] = ["quit", "exit", "bye"];

fn is_exit_command(input: &str) -> bool {
    EXIT_WORDS
        .iter()
        .any(|word| input.eq_ignore_ascii_case(word))
}

/// Run the read-eval-print chat loop until the user leaves
pub async fn interactive_command(config_loader: CliConfigLoader, verbose: bool) -> Result<()> {
    info!("Starting interactive mode");

    let config = config_loader.load().await?;

    println!("{}", style("🔗 querybridge").bold().cyan());
    println!("🔌 Connecting to tool server: {}", config.tool_server.display_command());

    let handler = CliOutputHandler::new(CliOutputConfig {
        show_debug: verbose,
        ..Default::default()
    });
    let session = start_session(&config, Box::new(handler.clone())).await?;

    println!(
        "✅ Connected. {} tools available, model {}",
        session.catalog().len(),
        style(session.model_name()).bold()
    );
    println!(
        "💡 Ask a question about the data. Type {} to leave.\n",
        style(EXIT_WORDS.join(" / ")).dim()
    );

    run_repl(
        session,
        &handler,
        BufReader::new(tokio::io::stdin()),
        std::io::stdout(),
    )
    .await
}

/// Drive the session from `input`, then shut it down whatever happened
async fn run_repl<R, W>(
    mut session: ChatSession,
    handler: &CliOutputHandler,
    input: R,
    mut out: W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let result = chat_loop(&mut session, handler, input, &mut out).await;

    if result.is_ok() {
        let _ = writeln!(out, "👋 Goodbye!");
    }
    if let Err(e) = session.shutdown().await {
        tracing::warn!("Failed to shut down tool server cleanly: {}", e);
    }

    result
}

async fn chat_loop<R, W>(
    session: &mut ChatSession,
    handler: &CliOutputHandler,
    input: R,
    out: &mut W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();

    loop {
        write!(out, "{} ", style("💬 You:").green().bold())?;
        out.flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                writeln!(out)?;
                return Ok(());
            }
        };

        let Some(line) = line else {
            writeln!(out)?;
            return Ok(());
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if is_exit_command(input) {
            return Ok(());
        }

        let turn = tokio::select! {
            turn = session.process_turn(input) => Some(turn),
            _ = tokio::signal::ctrl_c() => None,
        };

        match turn {
            Some(Ok(_)) => {}
            Some(Err(e)) if e.is_fatal_for_session() => {
                handler.stop_spinner();
                writeln!(out, "{} {}", style("❌ Session ended:").red().bold(), e)?;
                return Err(e.into());
            }
            Some(Err(e)) => {
                handler.stop_spinner();
                writeln!(out, "{} {}\n", style("❌ Error:").red(), e)?;
            }
            None => {
                handler.stop_spinner();
                writeln!(out, "{}\n", style("⏹️  Cancelled").yellow())?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use querybridge_core::error::ConnectionError;
    use querybridge_core::llm::{ChatOptions, LlmClient, LlmMessage, LlmResponse};
    use querybridge_core::{NullOutput, SessionConfig, ToolDescriptor, ToolService};
    use serde_json::Value;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    struct ScriptedLlm {
        replies: Mutex<VecDeque<String>>,
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn chat_completion(
            &self,
            _messages: Vec<LlmMessage>,
            _options: Option<ChatOptions>,
        ) -> querybridge_core::Result<LlmResponse> {
            let content = self.replies.lock().unwrap().pop_front().unwrap_or_default();
            Ok(LlmResponse {
                content,
                usage: None,
                model: "scripted".to_string(),
                finish_reason: None,
            })
        }

        fn model_name(&self) -> &str {
            "scripted"
        }

        fn provider_name(&self) -> &str {
            "test"
        }
    }

    /// Tool server whose connection is already gone
    struct ClosedServer {
        shutdowns: Arc<Mutex<usize>>,
    }

    #[async_trait]
    impl ToolService for ClosedServer {
        async fn list_tools(&mut self) -> querybridge_core::Result<Vec<ToolDescriptor>> {
            Ok(vec![ToolDescriptor::new("ping")])
        }

        async fn call_tool(&mut self, _name: &str, _arguments: Value) -> querybridge_core::Result<Value> {
            Err(ConnectionError::Closed.into())
        }

        async fn shutdown(&mut self) -> querybridge_core::Result<()> {
            *self.shutdowns.lock().unwrap() += 1;
            Ok(())
        }
    }

    /// Writer that fails on flush
    struct BrokenStdout;

    impl Write for BrokenStdout {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stdout closed"))
        }
    }

    async fn session(replies: &[&str]) -> (ChatSession, Arc<Mutex<usize>>) {
        let shutdowns = Arc::new(Mutex::new(0));
        let llm = ScriptedLlm {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
        };
        let session = ChatSession::bootstrap(
            Arc::new(llm),
            Box::new(ClosedServer {
                shutdowns: shutdowns.clone(),
            }),
            SessionConfig::default(),
            Box::new(NullOutput),
        )
        .await
        .unwrap();
        (session, shutdowns)
    }

    fn handler() -> CliOutputHandler {
        CliOutputHandler::new(CliOutputConfig {
            show_debug: false,
            show_spinner: false,
        })
    }

    #[test]
    fn test_exit_words() {
        assert!(is_exit_command("quit"));
        assert!(is_exit_command("EXIT"));
        assert!(is_exit_command("Bye"));
        assert!(!is_exit_command("quit please"));
        assert!(!is_exit_command("how many validators exited?"));
    }

    #[tokio::test]
    async fn test_stdout_failure_still_shuts_down() {
        let (session, shutdowns) = session(&[]).await;

        let result = run_repl(session, &handler(), "hello\n".as_bytes(), BrokenStdout).await;

        assert!(result.is_err());
        assert_eq!(*shutdowns.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_lost_connection_keeps_the_loop_running() {
        let (session, shutdowns) = session(&[
            r#"TOOL_CALL: {"tool_name": "ping", "arguments": {}}"#,
            "Hello there.",
        ])
        .await;
        let mut out = Vec::new();

        let input = "ping the server\n\nhello\nbye\n".as_bytes();
        run_repl(session, &handler(), input, &mut out).await.unwrap();

        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("Tool server closed the connection"));
        assert!(!printed.contains("Session ended"));
        assert!(printed.contains("Goodbye"));
        assert_eq!(*shutdowns.lock().unwrap(), 1);
    }
}
