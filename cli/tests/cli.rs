//! End-to-end tests of the querybridge binary

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Binary with a scrubbed environment rooted in `dir`
fn querybridge(dir: &TempDir) -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("querybridge").expect("querybridge binary should build");
    cmd.env_clear()
        .env("PATH", std::env::var("PATH").unwrap_or_default())
        .env("HOME", dir.path())
        .env("XDG_CONFIG_HOME", dir.path())
        .current_dir(dir.path());
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    querybridge(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("test"))
        .stdout(predicate::str::contains("tools"));
}

#[test]
fn test_missing_credentials_fail_startup() {
    let dir = TempDir::new().unwrap();
    querybridge(&dir)
        .arg("test")
        .assert()
        .failure()
        .stderr(predicate::str::contains("GROQ_API_KEY"));
}

#[test]
fn test_credentials_from_dotenv_reach_tool_server_startup() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join(".env"),
        "GROQ_API_KEY=gsk-test\nQUERYBRIDGE_MCP_COMMAND=\"querybridge-missing-mcp-server --stdio\"\n",
    )
    .unwrap();

    querybridge(&dir)
        .arg("test")
        .assert()
        .failure()
        .stderr(predicate::str::contains("querybridge-missing-mcp-server"));
}

#[test]
fn test_broken_dotenv_is_reported() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join(".env"),
        "GROQ_API_KEY=gsk-test\nthis line is not an assignment\nQUERYBRIDGE_MCP_COMMAND=querybridge-missing-mcp-server\n",
    )
    .unwrap();

    querybridge(&dir)
        .arg("test")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Could not fully read .env file"));
}

#[test]
fn test_invalid_tool_arguments_rejected() {
    let dir = TempDir::new().unwrap();
    querybridge(&dir)
        .args(["test", "--tool", "list_tables", "--args", "[\"goteth_mainnet\"]"])
        .env("GROQ_API_KEY", "gsk-test")
        .assert()
        .failure()
        .stderr(predicate::str::contains("JSON object"));
}

#[test]
fn test_config_file_with_bad_protocol() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("querybridge.json"),
        r#"{"protocol": "carrier-pigeon", "api_key": "k"}"#,
    )
    .unwrap();

    querybridge(&dir)
        .arg("tools")
        .assert()
        .failure()
        .stderr(predicate::str::contains("carrier-pigeon"));
}
