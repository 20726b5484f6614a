//! Leakwatch - cached static-analysis reports for GitHub repositories
//!
//! An HTTP service that, given `owner/name`, resolves the repository's
//! head commit and returns the stored analysis for that commit, or
//! clones the repository, runs the configured analyzer and records a
//! new analysis in the repository's history.
//!
//! Exit codes:
//!   0 - Clean shutdown
//!   1 - Startup error (config, database, bind failure, etc.)

mod analysis;
mod cli;
mod config;
mod error;
mod models;
mod orchestrator;
mod repo;
mod server;
mod store;

use anyhow::{Context, Result};
use cli::Args;
use config::{Config, DEFAULT_CONFIG_FILE};
use orchestrator::{Orchestrator, OrchestratorSettings};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use store::RepositoryStore;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args);

    info!("Leakwatch v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    if let Err(e) = run_server(args).await {
        error!("Server failed: {:#}", e);
        eprintln!("\n❌ Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Handle --init-config: generate a default leakwatch.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!("⚠️  {} already exists. Remove it first or edit it manually.", DEFAULT_CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to customize the port, database, analyzer and more.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
///
/// `RUST_LOG`, when set, overrides the CLI verbosity.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let builder = FmtSubscriber::builder()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));
    let subscriber = builder.with_env_filter(filter).finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Wire the collaborators together and serve until shutdown.
async fn run_server(args: Args) -> Result<()> {
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    let store = store::SqliteStore::open(&config.store.path)
        .with_context(|| format!("Cannot open database {}", config.store.path.display()))?;
    info!(
        "Database {} holds {} repositories",
        config.store.path.display(),
        store.count()?
    );

    let resolver = repo::GithubResolver::new(&config.github)?;
    let workspace = repo::GitWorkspace::new(
        &config.workspace,
        &config.github.clone_url,
        Some(config.github.branch.clone()),
    );
    let analyzer = analysis::CommandAnalyzer::new(&config.analyzer);

    let orchestrator = Orchestrator::new(
        Arc::new(resolver),
        Arc::new(workspace),
        Arc::new(analyzer),
        Arc::new(store),
        OrchestratorSettings {
            host: config.store.host.clone(),
            language: config.store.language.clone(),
        },
    );

    let ip: IpAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address: {}", config.server.bind))?;
    let addr = SocketAddr::new(ip, config.server.port);

    println!("🌍 Serving on http://{}", addr);
    server::start_server(addr, orchestrator).await
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", DEFAULT_CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
