//! CLI command implementations

pub mod interactive;
pub mod test;
pub mod tools;

pub use interactive::interactive_command;
pub use test::test_command;
pub use tools::tools_command;

use crate::config::AppConfig;
use anyhow::Result;
use querybridge_core::{create_client, ChatOutput, ChatSession, McpStdioClient};

/// Connect the model and the tool server, then bootstrap a session
pub(crate) async fn start_session(
    config: &AppConfig,
    output: Box<dyn ChatOutput>,
) -> Result<ChatSession> {
    let llm = create_client(&config.llm)?;
    let tools = McpStdioClient::connect(config.tool_server.clone()).await?;

    let session = ChatSession::builder(llm, Box::new(tools))
        .with_config(config.session.clone())
        .with_options(config.llm.params.clone().into())
        .with_output(output)
        .bootstrap()
        .await?;

    Ok(session)
}
