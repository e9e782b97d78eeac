//! Contract for the remote tool-execution service

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;

use super::ToolDescriptor;

/// A connection to a tool server.
///
/// The connection is used serially: each call completes (or fails) before
/// the next one is issued, hence `&mut self` and no internal locking.
#[async_trait]
pub trait ToolService: Send {
    /// Discover the callable tools
    async fn list_tools(&mut self) -> Result<Vec<ToolDescriptor>>;

    /// Invoke one tool and return its result payload
    async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<Value>;

    /// Release the connection; safe to call more than once
    async fn shutdown(&mut self) -> Result<()>;
}
