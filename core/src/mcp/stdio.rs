//! MCP client speaking newline-delimited JSON-RPC over a child process' stdio

use crate::config::ToolServerConfig;
use crate::error::{ConnectionError, Result, ToolError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::{timeout, Duration};

use super::{ToolDescriptor, ToolService};

const PROTOCOL_VERSION: &str = "2024-11-05";

/// Grace period for the server to exit after its stdin is closed
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Variables passed through when the full environment is not inherited
const SAFE_ENV_KEYS: &[&str] = &[
    "PATH",
    "HOME",
    "USER",
    "LANG",
    "LC_ALL",
    "LC_CTYPE",
    "TERM",
    "SHELL",
    "TMPDIR",
    "TMP",
    "TEMP",
    "VIRTUAL_ENV",
    "PYTHONPATH",
];

/// Connection to one MCP tool server process
pub struct McpStdioClient {
    config: ToolServerConfig,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    next_id: u64,
}

impl McpStdioClient {
    /// Launch the configured server and complete the MCP handshake
    pub async fn connect(config: ToolServerConfig) -> Result<Self> {
        config.validate()?;

        let program = &config.command[0];
        let resolved = which::which(program).map_err(|_| ConnectionError::CommandNotFound {
            command: program.clone(),
        })?;

        let mut cmd = Command::new(&resolved);
        cmd.args(&config.command[1..]);
        if !config.inherit_env {
            let safe_env: Vec<(String, String)> = std::env::vars()
                .filter(|(k, _)| SAFE_ENV_KEYS.contains(&k.as_str()))
                .collect();
            cmd.env_clear().envs(safe_env);
        }
        cmd.envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::info!("🔌 Starting tool server: {}", config.display_command());

        let mut child = cmd.spawn().map_err(|e| ConnectionError::Spawn {
            command: config.display_command(),
            message: e.to_string(),
        })?;

        let stdin = child.stdin.take().ok_or_else(|| ConnectionError::Spawn {
            command: config.display_command(),
            message: "stdin was not captured".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| ConnectionError::Spawn {
            command: config.display_command(),
            message: "stdout was not captured".to_string(),
        })?;

        if let Some(stderr) = child.stderr.take() {
            let server = program.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let line = line.trim_end();
                    if !line.is_empty() {
                        tracing::debug!(tool_server = %server, "{}", line);
                    }
                }
            });
        }

        let mut client = Self {
            config,
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
            next_id: 0,
        };

        let seconds = client.config.startup_timeout_secs;
        let handshake = timeout(Duration::from_secs(seconds), client.initialize()).await;
        match handshake {
            Ok(Ok(())) => Ok(client),
            Ok(Err(e)) => {
                client.kill().await;
                Err(ConnectionError::Handshake {
                    message: e.to_string(),
                }
                .into())
            }
            Err(_) => {
                client.kill().await;
                Err(ConnectionError::HandshakeTimeout { seconds }.into())
            }
        }
    }

    async fn initialize(&mut self) -> Result<()> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "querybridge",
                "version": crate::VERSION
            }
        });

        let result = self
            .request("initialize", params)
            .await?
            .map_err(|error| ConnectionError::Handshake {
                message: rpc_error_message(&error),
            })?;

        tracing::debug!(
            server = ?result.get("serverInfo"),
            protocol = ?result.get("protocolVersion"),
            "MCP handshake complete"
        );

        self.notify("notifications/initialized", json!({})).await
    }

    /// Send a request and wait for the reply carrying the same id.
    ///
    /// The outer result is the transport, the inner one the JSON-RPC outcome.
    async fn request(
        &mut self,
        method: &str,
        params: Value,
    ) -> Result<std::result::Result<Value, Value>> {
        self.next_id += 1;
        let id = self.next_id;

        self.write_message(&json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        }))
        .await?;

        loop {
            let message = self.read_message().await?;

            // Notifications and server-initiated requests are not ours
            if message.get("method").is_some() {
                tracing::trace!("Ignoring server message: {}", message);
                continue;
            }
            if message.get("id").and_then(Value::as_u64) != Some(id) {
                tracing::debug!("Skipping reply with unexpected id: {:?}", message.get("id"));
                continue;
            }

            if let Some(error) = message.get("error") {
                return Ok(Err(error.clone()));
            }
            return Ok(Ok(message.get("result").cloned().unwrap_or(Value::Null)));
        }
    }

    async fn notify(&mut self, method: &str, params: Value) -> Result<()> {
        self.write_message(&json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        }))
        .await
    }

    async fn write_message(&mut self, message: &Value) -> Result<()> {
        let stdin = self.stdin.as_mut().ok_or(ConnectionError::Closed)?;

        let mut line = serde_json::to_string(message)?;
        line.push('\n');

        let written = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.flush().await
        }
        .await;

        written.map_err(|e| {
            tracing::warn!("Failed to write to tool server: {}", e);
            ConnectionError::Closed.into()
        })
    }

    async fn read_message(&mut self) -> Result<Value> {
        let mut line = String::new();
        loop {
            line.clear();
            let read = self.stdout.read_line(&mut line).await.map_err(|e| {
                tracing::warn!("Failed to read from tool server: {}", e);
                ConnectionError::Closed
            })?;
            if read == 0 {
                return Err(ConnectionError::Closed.into());
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(trimmed) {
                Ok(message) => return Ok(message),
                Err(_) => tracing::debug!("Non JSON-RPC output from tool server: {}", trimmed),
            }
        }
    }

    async fn kill(&mut self) {
        self.stdin.take();
        if let Err(e) = self.child.kill().await {
            tracing::debug!("Tool server already gone: {}", e);
        }
    }
}

#[async_trait]
impl ToolService for McpStdioClient {
    async fn list_tools(&mut self) -> Result<Vec<ToolDescriptor>> {
        let seconds = self.config.call_timeout_secs;
        let mut descriptors = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = match &cursor {
                Some(cursor) => json!({ "cursor": cursor }),
                None => json!({}),
            };

            let reply = timeout(Duration::from_secs(seconds), self.request("tools/list", params))
                .await
                .map_err(|_| ToolError::Timeout {
                    name: "tools/list".to_string(),
                    seconds,
                })??;
            let result = reply.map_err(|error| ToolError::Protocol {
                message: rpc_error_message(&error),
            })?;

            let tools = result
                .get("tools")
                .and_then(Value::as_array)
                .ok_or_else(|| ToolError::Protocol {
                    message: "tools/list result has no 'tools' array".to_string(),
                })?;

            for entry in tools {
                match ToolDescriptor::from_mcp(entry) {
                    Some(descriptor) => descriptors.push(descriptor),
                    None => tracing::warn!("Skipping tool entry without a name: {}", entry),
                }
            }

            cursor = result
                .get("nextCursor")
                .and_then(Value::as_str)
                .map(str::to_string);
            if cursor.is_none() {
                break;
            }
        }

        tracing::debug!("Tool server reported {} tools", descriptors.len());
        Ok(descriptors)
    }

    async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<Value> {
        let seconds = self.config.call_timeout_secs;
        let params = json!({ "name": name, "arguments": arguments });

        let reply = timeout(Duration::from_secs(seconds), self.request("tools/call", params))
            .await
            .map_err(|_| ToolError::Timeout {
                name: name.to_string(),
                seconds,
            })??;

        let result = reply.map_err(|error| ToolError::ExecutionFailed {
            name: name.to_string(),
            message: rpc_error_message(&error),
        })?;

        if result.get("isError").and_then(Value::as_bool) == Some(true) {
            let message = content_text(&result).unwrap_or_else(|| "tool reported an error".to_string());
            return Err(ToolError::ExecutionFailed {
                name: name.to_string(),
                message,
            }
            .into());
        }

        Ok(normalize_result(result))
    }

    async fn shutdown(&mut self) -> Result<()> {
        // Closing stdin is the stdio transport's shutdown signal
        if self.stdin.take().is_none() {
            return Ok(());
        }

        match timeout(SHUTDOWN_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => tracing::debug!("Tool server exited with {}", status),
            Ok(Err(e)) => tracing::debug!("Failed to wait for tool server: {}", e),
            Err(_) => {
                tracing::debug!("Tool server did not exit, killing it");
                self.kill().await;
            }
        }
        Ok(())
    }
}

fn rpc_error_message(error: &Value) -> String {
    match error.get("message").and_then(Value::as_str) {
        Some(message) => match error.get("code") {
            Some(code) => format!("{} (code {})", message, code),
            None => message.to_string(),
        },
        None => error.to_string(),
    }
}

/// Joined text items of an MCP `content` array
fn content_text(result: &Value) -> Option<String> {
    let texts: Vec<&str> = result
        .get("content")?
        .as_array()?
        .iter()
        .filter(|item| item.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|item| item.get("text").and_then(Value::as_str))
        .collect();

    if texts.is_empty() {
        None
    } else {
        Some(texts.join("\n"))
    }
}

/// Reduce a `tools/call` result to the payload the model should see
fn normalize_result(result: Value) -> Value {
    if let Some(structured) = result.get("structuredContent") {
        if !structured.is_null() {
            return structured.clone();
        }
    }

    match content_text(&result) {
        Some(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        None => result.get("content").cloned().unwrap_or(result),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_content_preferred() {
        let result = json!({
            "content": [{"type": "text", "text": "ignored"}],
            "structuredContent": {"rows": 3}
        });
        assert_eq!(normalize_result(result), json!({"rows": 3}));
    }

    #[test]
    fn test_text_content_parsed_as_json() {
        let result = json!({
            "content": [{"type": "text", "text": "{\"status\":\"ok\"}"}],
            "isError": false
        });
        assert_eq!(normalize_result(result), json!({"status": "ok"}));
    }

    #[test]
    fn test_plain_text_content_kept_as_string() {
        let result = json!({
            "content": [
                {"type": "text", "text": "default"},
                {"type": "text", "text": "goteth_mainnet"}
            ]
        });
        assert_eq!(
            normalize_result(result),
            Value::String("default\ngoteth_mainnet".to_string())
        );
    }

    #[test]
    fn test_rpc_error_message_includes_code() {
        let error = json!({"code": -32601, "message": "Method not found"});
        assert_eq!(rpc_error_message(&error), "Method not found (code -32601)");
        assert_eq!(rpc_error_message(&json!("odd")), "\"odd\"");
    }
}
