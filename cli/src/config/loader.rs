//! CLI configuration loader for querybridge
//!
//! Implements single-source priority loading with flag overrides:
//! 1. --config file/dir (highest priority)
//! 2. Current working directory: ./querybridge.json or ./.querybridge/config.json
//! 3. User config dir: <config dir>/querybridge/config.json
//! 4. Environment variables only (no files)
//!
//! `QUERYBRIDGE_MCP_COMMAND` and `QUERYBRIDGE_HISTORY_CAP` apply on top of
//! whichever source was found; flags win over both.

use anyhow::{anyhow, Context, Result};
use querybridge_core::{ModelParams, Protocol, ResolvedLlmConfig, SessionConfig, ToolServerConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
const DEFAULT_GROQ_MODEL: &str = "llama-3.1-70b-versatile";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-sonnet-20241022";

/// Raw configuration file format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawConfig {
    /// Provider name: groq, openai, openai_compat or anthropic
    #[serde(default = "default_protocol")]
    pub protocol: String,
    /// API key (can be "env:VAR_NAME" for environment variable)
    pub api_key: String,
    /// Base URL (optional, uses provider default if not specified)
    #[serde(default)]
    pub base_url: Option<String>,
    /// Model name (optional, uses provider default if not specified)
    #[serde(default)]
    pub model: Option<String>,
    /// Model parameters (optional)
    #[serde(default)]
    pub params: ModelParams,
    /// Additional headers (optional)
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// How to launch the MCP tool server
    #[serde(default)]
    pub tool_server: ToolServerConfig,
    /// Conversation settings
    #[serde(default)]
    pub session: SessionConfig,
    /// File whose contents replace the built-in schema briefing
    #[serde(default)]
    pub briefing_file: Option<String>,
}

fn default_protocol() -> String {
    "groq".to_string()
}

/// Everything the commands need, resolved and validated
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub llm: ResolvedLlmConfig,
    pub tool_server: ToolServerConfig,
    pub session: SessionConfig,
}

/// CLI configuration loader
pub struct CliConfigLoader {
    /// Override config file/directory path
    config_override: Option<PathBuf>,
    /// Flag overrides
    protocol_override: Option<String>,
    api_key_override: Option<String>,
    base_url_override: Option<String>,
    model_override: Option<String>,
    history_cap_override: Option<usize>,
    server_command_override: Option<String>,
    /// Lookup roots, replaceable in tests
    working_dir: Option<PathBuf>,
    user_config_dir: Option<PathBuf>,
    /// When set, environment lookups only see this map
    env: Option<HashMap<String, String>>,
}

impl CliConfigLoader {
    /// Create a new loader
    pub fn new() -> Self {
        Self {
            config_override: None,
            protocol_override: None,
            api_key_override: None,
            base_url_override: None,
            model_override: None,
            history_cap_override: None,
            server_command_override: None,
            working_dir: None,
            user_config_dir: dirs::config_dir(),
            env: None,
        }
    }

    /// Set config file/directory override
    pub fn with_config_override(mut self, path: PathBuf) -> Self {
        self.config_override = Some(path);
        self
    }

    /// Set protocol override
    pub fn with_protocol_override(mut self, protocol: String) -> Self {
        self.protocol_override = Some(protocol);
        self
    }

    /// Set API key override
    pub fn with_api_key_override(mut self, api_key: String) -> Self {
        self.api_key_override = Some(api_key);
        self
    }

    /// Set base URL override
    pub fn with_base_url_override(mut self, base_url: String) -> Self {
        self.base_url_override = Some(base_url);
        self
    }

    /// Set model override
    pub fn with_model_override(mut self, model: String) -> Self {
        self.model_override = Some(model);
        self
    }

    pub fn with_history_cap_override(mut self, history_cap: usize) -> Self {
        self.history_cap_override = Some(history_cap);
        self
    }

    /// Set tool server command line override (split on whitespace)
    pub fn with_server_command_override(mut self, command: String) -> Self {
        self.server_command_override = Some(command);
        self
    }

    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }

    pub fn with_user_config_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.user_config_dir = dir;
        self
    }

    /// Read environment variables from `vars` instead of the process
    pub fn with_env(mut self, vars: HashMap<String, String>) -> Self {
        self.env = Some(vars);
        self
    }

    /// Load and resolve configuration
    pub async fn load(&self) -> Result<AppConfig> {
        // Step 1: Find and load base configuration
        let mut config = if let Some(override_path) = &self.config_override {
            let path = self.expand_path(&override_path.to_string_lossy());
            self.load_from_path(&path).await.with_context(|| {
                format!(
                    "Failed to load config from override path: {}",
                    override_path.display()
                )
            })?
        } else {
            self.search_and_load().await?
        };

        // Step 2: Environment overrides, on top of any config file
        if let Some(command) = self.var("QUERYBRIDGE_MCP_COMMAND") {
            config.tool_server.command = split_command(&command);
        }
        if let Some(cap) = self.var("QUERYBRIDGE_HISTORY_CAP") {
            config.session.history_cap = cap
                .trim()
                .parse()
                .with_context(|| format!("QUERYBRIDGE_HISTORY_CAP is not a number: {}", cap))?;
        }

        // Step 3: Apply flag overrides
        if let Some(protocol) = &self.protocol_override {
            config.protocol = protocol.clone();
        }
        if let Some(api_key) = &self.api_key_override {
            config.api_key = api_key.clone();
        }
        if let Some(base_url) = &self.base_url_override {
            config.base_url = Some(base_url.clone());
        }
        if let Some(model) = &self.model_override {
            config.model = Some(model.clone());
        }
        if let Some(history_cap) = self.history_cap_override {
            config.session.history_cap = history_cap;
        }
        if let Some(command) = &self.server_command_override {
            config.tool_server.command = split_command(command);
        }

        // Step 4: Resolve to final config
        self.resolve_config(config).await
    }

    /// Search for config in priority order
    async fn search_and_load(&self) -> Result<RawConfig> {
        let cwd = match &self.working_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };

        let candidates = [
            Some(cwd.join("querybridge.json")),
            Some(cwd.join(".querybridge").join("config.json")),
            self.user_config_dir
                .as_ref()
                .map(|dir| dir.join("querybridge").join("config.json")),
        ];

        for path in candidates.into_iter().flatten() {
            if path.is_file() {
                tracing::debug!("Loading config from {}", path.display());
                return self.load_file(&path).await;
            }
        }

        self.try_load_env_only()
    }

    /// Build a config from environment variables only
    fn try_load_env_only(&self) -> Result<RawConfig> {
        let groq_key = self.var("GROQ_API_KEY");
        let openai_key = self.var("OPENAI_API_KEY");
        let anthropic_key = self.var("ANTHROPIC_API_KEY");

        let available_keys: Vec<_> = [
            groq_key.as_ref().map(|_| "groq"),
            openai_key.as_ref().map(|_| "openai"),
            anthropic_key.as_ref().map(|_| "anthropic"),
        ]
        .into_iter()
        .flatten()
        .collect();

        let env_protocol = self.var("QUERYBRIDGE_PROTOCOL");
        let protocol_preference = self
            .protocol_override
            .as_ref()
            .or(env_protocol.as_ref())
            .map(|p| p.to_lowercase());

        let (protocol, api_key) = match (protocol_preference.as_deref(), &self.api_key_override) {
            // An explicit key works with any protocol
            (Some(preferred), Some(key)) => (preferred.to_string(), key.clone()),
            (None, Some(key)) => ("groq".to_string(), key.clone()),
            (Some("groq"), None) if groq_key.is_some() => ("groq".to_string(), groq_key.clone().unwrap_or_default()),
            (Some("openai" | "openai_compat"), None) if openai_key.is_some() => {
                ("openai".to_string(), openai_key.clone().unwrap_or_default())
            }
            (Some("anthropic"), None) if anthropic_key.is_some() => {
                ("anthropic".to_string(), anthropic_key.clone().unwrap_or_default())
            }
            (Some(preferred), None) => {
                return Err(anyhow!(
                    "Protocol '{}' specified but no corresponding API key found. Available keys: {}",
                    preferred,
                    if available_keys.is_empty() {
                        "none".to_string()
                    } else {
                        available_keys.join(", ")
                    }
                ))
            }
            (None, None) => match available_keys.as_slice() {
                [] => {
                    return Err(anyhow!(
                        "No configuration found. Set GROQ_API_KEY (or OPENAI_API_KEY / ANTHROPIC_API_KEY), \
                         for example in a .env file, or create a querybridge.json file"
                    ))
                }
                ["groq"] => ("groq".to_string(), groq_key.clone().unwrap_or_default()),
                ["openai"] => ("openai".to_string(), openai_key.clone().unwrap_or_default()),
                ["anthropic"] => ("anthropic".to_string(), anthropic_key.clone().unwrap_or_default()),
                _ => {
                    return Err(anyhow!(
                        "Multiple API keys detected: {}. Please specify which protocol to use with QUERYBRIDGE_PROTOCOL or --protocol",
                        available_keys.join(", ")
                    ))
                }
            },
        };

        let (model, base_url) = match protocol.as_str() {
            "groq" => (self.var("GROQ_MODEL"), None),
            "anthropic" => (self.var("ANTHROPIC_MODEL"), self.var("ANTHROPIC_BASE_URL")),
            _ => (self.var("OPENAI_MODEL"), self.var("OPENAI_BASE_URL")),
        };

        Ok(RawConfig {
            protocol,
            api_key,
            base_url,
            model,
            params: ModelParams::default(),
            headers: HashMap::new(),
            tool_server: ToolServerConfig::default(),
            session: SessionConfig::default(),
            briefing_file: None,
        })
    }

    /// Load configuration from a specific path (file or directory)
    async fn load_from_path(&self, path: &Path) -> Result<RawConfig> {
        if path.is_file() {
            self.load_file(path).await
        } else if path.is_dir() {
            let config_file = path.join("config.json");
            if config_file.exists() {
                self.load_file(&config_file).await
            } else {
                Err(anyhow!(
                    "No config.json found in directory: {}",
                    path.display()
                ))
            }
        } else {
            Err(anyhow!("Config path does not exist: {}", path.display()))
        }
    }

    /// Load a single config file
    async fn load_file(&self, path: &Path) -> Result<RawConfig> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Resolve raw config to AppConfig
    async fn resolve_config(&self, config: RawConfig) -> Result<AppConfig> {
        let provider = config.protocol.to_lowercase();
        let protocol: Protocol = provider.parse()?;

        // Resolve API key (handle env: prefix)
        let api_key = match config.api_key.strip_prefix("env:") {
            Some(var_name) => self
                .var(var_name)
                .ok_or_else(|| anyhow!("Environment variable not found: {}", var_name))?,
            None => config.api_key,
        };

        let base_url = config.base_url.unwrap_or_else(|| match provider.as_str() {
            "groq" => GROQ_BASE_URL.to_string(),
            _ => protocol.default_base_url().to_string(),
        });

        let model = config.model.unwrap_or_else(|| {
            match provider.as_str() {
                "groq" => DEFAULT_GROQ_MODEL,
                "anthropic" => DEFAULT_ANTHROPIC_MODEL,
                _ => DEFAULT_OPENAI_MODEL,
            }
            .to_string()
        });

        let llm = ResolvedLlmConfig::new(protocol, base_url, api_key, model)
            .with_params(config.params)
            .with_headers(config.headers);
        llm.validate()
            .map_err(|e| anyhow!("Configuration validation failed: {}", e))?;

        let mut tool_server = config.tool_server;
        tool_server.command = tool_server
            .command
            .iter()
            .map(|part| shellexpand::tilde(part).into_owned())
            .collect();
        tool_server
            .validate()
            .map_err(|e| anyhow!("Configuration validation failed: {}", e))?;

        let mut session = config.session;
        if let Some(briefing_file) = &config.briefing_file {
            let path = self.expand_path(briefing_file);
            let briefing = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read briefing file: {}", path.display()))?;
            session.briefing = Some(briefing);
        }
        session
            .validate()
            .map_err(|e| anyhow!("Configuration validation failed: {}", e))?;

        Ok(AppConfig {
            llm,
            tool_server,
            session,
        })
    }

    fn var(&self, name: &str) -> Option<String> {
        let value = match &self.env {
            Some(vars) => vars.get(name).cloned(),
            None => std::env::var(name).ok(),
        };
        value.filter(|v| !v.trim().is_empty())
    }

    fn expand_path(&self, path: &str) -> PathBuf {
        let expanded = PathBuf::from(shellexpand::tilde(path).into_owned());
        match (&self.working_dir, expanded.is_relative()) {
            (Some(dir), true) => dir.join(expanded),
            _ => expanded,
        }
    }
}

impl Default for CliConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn split_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn loader(dir: &TempDir, vars: &[(&str, &str)]) -> CliConfigLoader {
        CliConfigLoader::new()
            .with_working_dir(dir.path().to_path_buf())
            .with_user_config_dir(None)
            .with_env(
                vars.iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            )
    }

    #[tokio::test]
    async fn test_groq_from_environment() {
        let dir = TempDir::new().unwrap();
        let config = loader(&dir, &[("GROQ_API_KEY", "gsk-test")]).load().await.unwrap();

        assert_eq!(config.llm.protocol, Protocol::OpenAICompat);
        assert_eq!(config.llm.base_url, GROQ_BASE_URL);
        assert_eq!(config.llm.model, DEFAULT_GROQ_MODEL);
        assert_eq!(config.tool_server.display_command(), "python -m mcp_clickhouse.main");
        assert_eq!(config.session.history_cap, 20);
    }

    #[tokio::test]
    async fn test_missing_credentials_names_variables() {
        let dir = TempDir::new().unwrap();
        let err = loader(&dir, &[]).load().await.unwrap_err();
        assert!(err.to_string().contains("GROQ_API_KEY"));
    }

    #[tokio::test]
    async fn test_multiple_keys_need_protocol() {
        let dir = TempDir::new().unwrap();
        let vars = [("GROQ_API_KEY", "gsk"), ("ANTHROPIC_API_KEY", "sk-ant")];
        assert!(loader(&dir, &vars).load().await.is_err());

        let config = loader(&dir, &vars)
            .with_protocol_override("anthropic".to_string())
            .load()
            .await
            .unwrap();
        assert_eq!(config.llm.protocol, Protocol::Anthropic);
        assert_eq!(config.llm.api_key, "sk-ant");
    }

    #[tokio::test]
    async fn test_environment_tool_server_and_history() {
        let dir = TempDir::new().unwrap();
        let config = loader(
            &dir,
            &[
                ("GROQ_API_KEY", "gsk"),
                ("GROQ_MODEL", "llama-3.3-70b-versatile"),
                ("QUERYBRIDGE_MCP_COMMAND", "uvx  mcp-clickhouse"),
                ("QUERYBRIDGE_HISTORY_CAP", "8"),
            ],
        )
        .load()
        .await
        .unwrap();

        assert_eq!(config.llm.model, "llama-3.3-70b-versatile");
        assert_eq!(config.tool_server.command, vec!["uvx", "mcp-clickhouse"]);
        assert_eq!(config.session.history_cap, 8);
    }

    #[tokio::test]
    async fn test_environment_overrides_config_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("querybridge.json"),
            r#"{
                "api_key": "gsk-file",
                "tool_server": {"command": ["mcp-clickhouse"]},
                "session": {"history_cap": 4}
            }"#,
        )
        .unwrap();
        let vars = [
            ("QUERYBRIDGE_MCP_COMMAND", "uvx mcp-clickhouse"),
            ("QUERYBRIDGE_HISTORY_CAP", "12"),
        ];

        let config = loader(&dir, &vars).load().await.unwrap();
        assert_eq!(config.tool_server.command, vec!["uvx", "mcp-clickhouse"]);
        assert_eq!(config.session.history_cap, 12);

        let config = loader(&dir, &vars)
            .with_history_cap_override(2)
            .load()
            .await
            .unwrap();
        assert_eq!(config.session.history_cap, 2);
    }

    #[tokio::test]
    async fn test_working_dir_file_with_env_key() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("briefing.txt"), "Only table: t_blocks").unwrap();
        std::fs::write(
            dir.path().join("querybridge.json"),
            r#"{
                "protocol": "openai",
                "api_key": "env:MY_KEY",
                "base_url": "http://localhost:8000/v1",
                "model": "local-model",
                "tool_server": {"command": ["mcp-clickhouse"], "call_timeout_secs": 5},
                "session": {"history_cap": 4},
                "briefing_file": "briefing.txt"
            }"#,
        )
        .unwrap();

        let config = loader(&dir, &[("MY_KEY", "secret")]).load().await.unwrap();
        assert_eq!(config.llm.api_key, "secret");
        assert_eq!(config.llm.base_url, "http://localhost:8000/v1");
        assert_eq!(config.tool_server.call_timeout_secs, 5);
        assert_eq!(config.tool_server.startup_timeout_secs, 30);
        assert_eq!(config.session.history_cap, 4);
        assert_eq!(config.session.briefing.as_deref(), Some("Only table: t_blocks"));
    }

    #[tokio::test]
    async fn test_flag_overrides_win() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join(".querybridge")).unwrap();
        std::fs::write(
            dir.path().join(".querybridge").join("config.json"),
            r#"{"protocol": "groq", "api_key": "gsk-file"}"#,
        )
        .unwrap();

        let config = loader(&dir, &[])
            .with_model_override("llama-3.1-8b-instant".to_string())
            .with_history_cap_override(2)
            .with_server_command_override("python -m mcp_clickhouse.main --debug".to_string())
            .load()
            .await
            .unwrap();

        assert_eq!(config.llm.api_key, "gsk-file");
        assert_eq!(config.llm.model, "llama-3.1-8b-instant");
        assert_eq!(config.session.history_cap, 2);
        assert_eq!(config.tool_server.command.len(), 4);
    }

    #[tokio::test]
    async fn test_missing_env_reference_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.json");
        std::fs::write(&path, r#"{"api_key": "env:NOT_SET_ANYWHERE"}"#).unwrap();

        let err = loader(&dir, &[])
            .with_config_override(path)
            .load()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("NOT_SET_ANYWHERE"));
    }
}
