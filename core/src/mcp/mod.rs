//! Tool server access over the Model Context Protocol

pub mod descriptor;
pub mod service;
pub mod stdio;

pub use descriptor::{ToolCatalog, ToolDescriptor};
pub use service::ToolService;
pub use stdio::McpStdioClient;
