//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and environment fallbacks.

use clap::Parser;
use std::path::PathBuf;

/// Leakwatch - cached static-analysis reports for GitHub repos
///
/// Serves `GET /leaks/go/{user}/{repo}`: resolves the repository's head
/// commit, reuses the stored report when the commit is unchanged, and
/// otherwise clones, analyzes and records a new report.
///
/// Examples:
///   leakwatch --port 8080
///   leakwatch --config ./leakwatch.toml --verbose
///   leakwatch --init-config
#[derive(Parser, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Port to listen on
    ///
    /// Defaults to the config file value, or 80.
    #[arg(short, long, env = "PORT", value_name = "PORT")]
    pub port: Option<u16>,

    /// Address to bind
    #[arg(long, env = "LEAKWATCH_BIND", value_name = "ADDR")]
    pub bind: Option<String>,

    /// SQLite database holding repository reports
    #[arg(long, env = "LEAKWATCH_DB", value_name = "FILE")]
    pub database: Option<PathBuf>,

    /// Directory repositories are staged under while being analyzed
    #[arg(long, env = "LEAKWATCH_WORKSPACE", value_name = "DIR")]
    pub workspace_root: Option<PathBuf>,

    /// GitHub API token for commit lookups
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Path to configuration file
    ///
    /// If not specified, looks for leakwatch.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default leakwatch.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

// The token is redacted: arguments are logged at debug level.
impl std::fmt::Debug for Args {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Args")
            .field("port", &self.port)
            .field("bind", &self.bind)
            .field("database", &self.database)
            .field("workspace_root", &self.workspace_root)
            .field("github_token", &self.github_token.as_ref().map(|_| "<redacted>"))
            .field("config", &self.config)
            .field("verbose", &self.verbose)
            .field("quiet", &self.quiet)
            .field("init_config", &self.init_config)
            .finish()
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.port == Some(0) {
            return Err("Port must be between 1 and 65535".to_string());
        }

        if let Some(ref config_path) = self.config {
            if !config_path.is_file() {
                return Err(format!(
                    "Config file does not exist: {}",
                    config_path.display()
                ));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
