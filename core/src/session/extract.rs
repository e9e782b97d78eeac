//! Extraction of marker-prefixed tool calls from free-form model output

use crate::error::MalformedToolCall;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub tool_name: String,
    pub arguments: Map<String, Value>,
}

impl ToolCallRequest {
    pub fn new<S: Into<String>>(tool_name: S, arguments: Map<String, Value>) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
        }
    }

    /// Build a request from a loose JSON value; anything but an object is rejected
    pub fn from_value<S: Into<String>>(tool_name: S, arguments: Value) -> Result<Self, MalformedToolCall> {
        match arguments {
            Value::Object(arguments) => Ok(Self::new(tool_name, arguments)),
            Value::Null => Ok(Self::new(tool_name, Map::new())),
            _ => Err(MalformedToolCall::WrongType {
                field: "arguments".to_string(),
                expected: "an object".to_string(),
            }),
        }
    }

    pub fn arguments_value(&self) -> Value {
        Value::Object(self.arguments.clone())
    }

    /// Render the request the way the model is asked to write it
    pub fn to_marker_text(&self, marker: &str) -> String {
        let body = serde_json::json!({
            "tool_name": self.tool_name,
            "arguments": self.arguments,
        });
        format!("{} {}", marker, body)
    }
}

/// Find the first tool call in `text`.
///
/// Returns `Ok(None)` when the marker does not occur. Only the first marker
/// is considered; anything after its JSON object is treated as prose.
pub fn extract_tool_call(text: &str, marker: &str) -> Result<Option<ToolCallRequest>, MalformedToolCall> {
    let Some(position) = text.find(marker) else {
        return Ok(None);
    };

    let rest = &text[position + marker.len()..];
    let object = balanced_object(rest)?;

    let value: Value = serde_json::from_str(object).map_err(|e| MalformedToolCall::InvalidJson {
        message: e.to_string(),
    })?;

    parse_request(value).map(Some)
}

/// Prose the model wrote before the marker, trimmed
pub fn text_before_marker<'a>(text: &'a str, marker: &str) -> &'a str {
    match text.find(marker) {
        Some(position) => text[..position].trim(),
        None => text.trim(),
    }
}

/// Slice out the first brace-balanced object, ignoring braces inside string literals
fn balanced_object(rest: &str) -> Result<&str, MalformedToolCall> {
    let start = rest.find('{').ok_or(MalformedToolCall::MissingObject)?;

    // Delimiters are ASCII, so byte offsets stay on char boundaries
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, byte) in rest.as_bytes()[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if *byte == b'\\' {
                escaped = true;
            } else if *byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(&rest[start..=start + offset]);
                }
            }
            _ => {}
        }
    }

    Err(MalformedToolCall::Truncated)
}

fn parse_request(value: Value) -> Result<ToolCallRequest, MalformedToolCall> {
    let Value::Object(mut object) = value else {
        return Err(MalformedToolCall::WrongType {
            field: "tool call".to_string(),
            expected: "a JSON object".to_string(),
        });
    };

    let tool_name = match object.remove("tool_name") {
        Some(Value::String(name)) if !name.trim().is_empty() => name.trim().to_string(),
        Some(Value::String(_)) | None => {
            return Err(MalformedToolCall::MissingField {
                field: "tool_name".to_string(),
            })
        }
        Some(_) => {
            return Err(MalformedToolCall::WrongType {
                field: "tool_name".to_string(),
                expected: "a string".to_string(),
            })
        }
    };

    let arguments = match object.remove("arguments") {
        Some(Value::Object(arguments)) => arguments,
        None => {
            return Err(MalformedToolCall::MissingField {
                field: "arguments".to_string(),
            })
        }
        Some(_) => {
            return Err(MalformedToolCall::WrongType {
                field: "arguments".to_string(),
                expected: "an object".to_string(),
            })
        }
    };

    Ok(ToolCallRequest {
        tool_name,
        arguments,
    })
}
