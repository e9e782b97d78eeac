//! Tool dispatch and outcome folding

use crate::error::{Error, Result, ToolError};
use crate::mcp::{ToolCatalog, ToolService};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ToolCallRequest;

/// Result of one dispatched tool call, success or failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallOutcome {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ToolCallOutcome {
    pub fn success(payload: Value) -> Self {
        Self {
            ok: true,
            payload: Some(payload),
            error_message: None,
        }
    }

    pub fn failure<S: Into<String>>(message: S) -> Self {
        Self {
            ok: false,
            payload: None,
            error_message: Some(message.into()),
        }
    }

    /// Text of the `tool_result` turn fed back to the model
    pub fn to_turn_text(&self, tool_name: &str) -> String {
        if self.ok {
            let payload = match &self.payload {
                Some(Value::String(text)) => text.clone(),
                Some(value) => value.to_string(),
                None => "null".to_string(),
            };
            format!("{} returned:\n{}", tool_name, payload)
        } else {
            format!(
                "{} failed: {}\nAnswer from what you already know, or tell the user what went wrong.",
                tool_name,
                self.error_message.as_deref().unwrap_or("unknown error")
            )
        }
    }
}

/// Execute `request` against the tool service.
///
/// Unknown tools and tool-side failures come back as failed outcomes; only
/// errors that make the service itself unusable are returned as `Err`.
pub async fn dispatch(
    catalog: &ToolCatalog,
    service: &mut dyn ToolService,
    request: &ToolCallRequest,
) -> Result<ToolCallOutcome> {
    let Some(descriptor) = catalog.get(&request.tool_name) else {
        tracing::warn!("Model requested unknown tool '{}'", request.tool_name);
        return Ok(ToolCallOutcome::failure(format!(
            "unknown tool: {}",
            request.tool_name
        )));
    };

    let missing: Vec<&str> = descriptor
        .required
        .iter()
        .filter(|name| !request.arguments.contains_key(name.as_str()))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        return Ok(ToolCallOutcome::failure(format!(
            "missing required argument(s) for {}: {}",
            request.tool_name,
            missing.join(", ")
        )));
    }

    tracing::info!(
        "🔨 Calling tool {} with {}",
        request.tool_name,
        request.arguments_value()
    );

    match service
        .call_tool(&request.tool_name, request.arguments_value())
        .await
    {
        Ok(payload) => Ok(ToolCallOutcome::success(payload)),
        Err(Error::Tool(ToolError::Timeout { seconds, .. })) => {
            tracing::warn!("Tool {} timed out after {}s", request.tool_name, seconds);
            Ok(ToolCallOutcome::failure(format!(
                "timed out after {}s waiting for {}",
                seconds, request.tool_name
            )))
        }
        Err(Error::Tool(ToolError::ExecutionFailed { message, .. }))
        | Err(Error::Tool(ToolError::Protocol { message })) => {
            tracing::warn!("Tool {} failed: {}", request.tool_name, message);
            Ok(ToolCallOutcome::failure(message))
        }
        Err(e) => Err(e),
    }
}
