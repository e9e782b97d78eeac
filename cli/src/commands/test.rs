//! Connectivity self-test

use crate::config::CliConfigLoader;
use crate::output::{CliOutputConfig, CliOutputHandler};
use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use tracing::info;

use super::start_session;

/// Check configuration, tool server discovery, one tool call and optionally
/// one full question.
pub async fn test_command(
    config_loader: CliConfigLoader,
    tool: String,
    args: Option<String>,
    ask: Option<String>,
    verbose: bool,
) -> Result<()> {
    info!("Running connectivity test");

    let arguments: Value = match &args {
        Some(raw) => serde_json::from_str(raw).with_context(|| format!("Invalid --args JSON: {}", raw))?,
        None => Value::Object(Default::default()),
    };
    if !arguments.is_object() {
        return Err(anyhow!("--args must be a JSON object, got: {}", arguments));
    }

    println!("🧪 Running querybridge tests\n");

    // Test 1: Configuration loading
    println!("📋 Test 1: Configuration");
    let config = config_loader.load().await?;
    println!(
        "   ✅ {} via {} ({})",
        config.llm.model,
        config.llm.protocol.as_str(),
        config.llm.base_url
    );

    // Test 2: Tool server
    println!("🔌 Test 2: Tool server ({})", config.tool_server.display_command());
    let handler = CliOutputHandler::new(CliOutputConfig {
        show_debug: verbose,
        show_spinner: false,
    });
    let mut session = start_session(&config, Box::new(handler)).await?;
    println!("   ✅ {} tools discovered", session.catalog().len());
    for descriptor in session.catalog().iter() {
        println!("      📦 {}", descriptor.signature());
    }

    let mut failures = Vec::new();

    // Test 3: Direct tool call
    println!("🛠️  Test 3: {} {}", tool, arguments);
    match session.run_tool(&tool, arguments).await {
        Ok(outcome) if outcome.ok => {
            let payload = outcome.payload.unwrap_or(Value::Null);
            println!("   ✅ {}: {}", tool, summarize(&payload));
        }
        Ok(outcome) => {
            let message = outcome.error_message.unwrap_or_default();
            println!("   ❌ {}: {}", tool, message);
            failures.push(format!("{}: {}", tool, message));
        }
        Err(e) => {
            println!("   ❌ {}: {}", tool, e);
            failures.push(format!("{}: {}", tool, e));
        }
    }

    // Test 4: Full round trip through the model
    if let Some(question) = ask {
        println!("🤖 Test 4: {}", question);
        match session.process_turn(&question).await {
            Ok(report) => println!("   ✅ Answered ({})", state_label(&report.state)),
            Err(e) => {
                println!("   ❌ {}", e);
                failures.push(format!("question: {}", e));
            }
        }
    }

    if let Err(e) = session.shutdown().await {
        tracing::warn!("Failed to shut down tool server cleanly: {}", e);
    }

    if failures.is_empty() {
        println!("\n🎉 All tests passed!");
        Ok(())
    } else {
        Err(anyhow!("{} test(s) failed: {}", failures.len(), failures.join("; ")))
    }
}

fn state_label(state: &querybridge_core::TurnState) -> &'static str {
    match state {
        querybridge_core::TurnState::PlainAnswer => "plain answer",
        querybridge_core::TurnState::ToolAnswered { .. } => "answered from tool result",
        querybridge_core::TurnState::MalformedCall { .. } => "malformed tool call",
    }
}

/// One-line description of a tool payload
fn summarize(payload: &Value) -> String {
    match payload {
        Value::Array(items) => format!("{} item(s)", items.len()),
        Value::Object(map) => format!("object with {} field(s)", map.len()),
        Value::String(text) => {
            let lines = text.lines().count();
            if lines > 1 {
                format!("{} line(s) of text", lines)
            } else {
                text.clone()
            }
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_summarize_payloads() {
        assert_eq!(summarize(&json!(["default", "goteth_mainnet"])), "2 item(s)");
        assert_eq!(summarize(&json!({"status": "ok"})), "object with 1 field(s)");
        assert_eq!(summarize(&json!("a\nb\nc")), "3 line(s) of text");
        assert_eq!(summarize(&json!(42)), "42");
    }
}
