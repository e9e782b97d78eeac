//! Output handlers for the CLI

pub mod cli_handler;

pub use cli_handler::{CliOutputConfig, CliOutputHandler};
