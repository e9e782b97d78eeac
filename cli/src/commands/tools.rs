//! Tools listing command

use crate::config::CliConfigLoader;
use anyhow::Result;
use querybridge_core::NullOutput;
use tracing::info;

use super::start_session;

/// Show the tools exposed by the configured tool server
pub async fn tools_command(config_loader: CliConfigLoader) -> Result<()> {
    info!("Listing available tools");

    let config = config_loader.load().await?;
    let session = start_session(&config, Box::new(NullOutput)).await?;

    println!("🛠️  Available Tools ({})\n", config.tool_server.display_command());

    for tool in session.catalog().iter() {
        println!("📦 {}", tool.signature());
        // Show first line of description only for brevity
        if let Some(first_line) = tool.description.lines().next() {
            println!("   {}", first_line);
        }
        println!();
    }

    println!("💡 Ask questions in interactive mode and the model will pick from these tools.");

    session.shutdown().await?;
    Ok(())
}
