//! Minimal configuration module for querybridge core
//!
//! Only exports pure data types. All loading logic is in CLI layer.

pub mod types;

pub use types::{
    ModelParams, Protocol, ResolvedLlmConfig, SessionConfig, ToolServerConfig,
    DEFAULT_HISTORY_CAP, DEFAULT_TOOL_CALL_MARKER,
};
