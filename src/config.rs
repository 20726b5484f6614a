//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `leakwatch.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "leakwatch.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Repository store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Hosting service settings.
    #[serde(default)]
    pub github: GithubConfig,

    /// Local staging settings.
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// External analyzer settings.
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    80
}

/// Repository store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database file.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// Host prefix of canonical repository URLs.
    #[serde(default = "default_host")]
    pub host: String,

    /// Language tag written on newly created records.
    #[serde(default = "default_language")]
    pub language: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            host: default_host(),
            language: default_language(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("leakwatch.db")
}

fn default_host() -> String {
    "github.com".to_string()
}

fn default_language() -> Option<String> {
    Some("GO".to_string())
}

/// Hosting service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    /// REST API base URL.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Base URL repositories are cloned from.
    #[serde(default = "default_clone_url")]
    pub clone_url: String,

    /// Branch whose head is resolved and staged.
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Whole-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// API token, sent as a bearer token when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            clone_url: default_clone_url(),
            branch: default_branch(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            token: None,
        }
    }
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_clone_url() -> String {
    "https://github.com".to_string()
}

fn default_branch() -> String {
    "master".to_string()
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_request_timeout() -> u64 {
    10
}

/// Local staging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Directory under which repositories are staged.
    #[serde(default = "default_workspace_root")]
    pub root: PathBuf,

    /// Clone depth; zero or less fetches full history.
    #[serde(default = "default_depth")]
    pub depth: i32,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: default_workspace_root(),
            depth: default_depth(),
        }
    }
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from("repositories")
}

fn default_depth() -> i32 {
    1
}

/// External analyzer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Program to run inside the staged tree.
    #[serde(default = "default_analyzer_command")]
    pub command: String,

    /// Arguments passed to the program.
    #[serde(default = "default_analyzer_args")]
    pub args: Vec<String>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            command: default_analyzer_command(),
            args: default_analyzer_args(),
        }
    }
}

fn default_analyzer_command() -> String {
    "go".to_string()
}

fn default_analyzer_args() -> Vec<String> {
    vec!["vet".to_string(), "./...".to_string()]
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were actually provided.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(port) = args.port {
            self.server.port = port;
        }
        if let Some(ref bind) = args.bind {
            self.server.bind = bind.clone();
        }
        if let Some(ref database) = args.database {
            self.store.path = database.clone();
        }
        if let Some(ref root) = args.workspace_root {
            self.workspace.root = root.clone();
        }
        if let Some(ref token) = args.github_token {
            self.github.token = Some(token.clone());
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
