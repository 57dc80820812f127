use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use warden_config::{ConfigLoader, WardenConfig};

/// Warden — governance and operational-risk control plane
#[derive(Parser)]
#[command(name = "warden", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to warden.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the governance API server
    Serve,
    /// Validate configuration and print any warnings
    Check,
    /// Show the effective configuration
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show version and build info
    Version,
}

impl Cli {
    pub async fn run(self) -> warden_core::Result<()> {
        // Load config first so we can use it for log format
        let loader = ConfigLoader::load(self.config.as_deref())?;
        let config = loader.get();

        // Resolve log level: --verbose > --quiet > --log-level > config
        let log_level = if self.verbose {
            "debug".to_string()
        } else if self.quiet {
            "error".to_string()
        } else {
            self.log_level
                .clone()
                .unwrap_or_else(|| config.logging.level.clone())
        };

        if config.logging.format == "json" {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
                )
                .json()
                .with_target(true)
                .init();
        } else {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
                )
                .with_target(false)
                .init();
        }

        match self.command {
            Commands::Serve => cmd_serve(config).await,
            Commands::Check => cmd_check(&loader),
            Commands::Config { json } => cmd_config(&config, json),
            Commands::Version => cmd_version(),
        }
    }
}

async fn cmd_serve(config: WardenConfig) -> warden_core::Result<()> {
    let listen = config.server.listen.clone();
    let state = warden_server::build_state(config)?;
    warden_server::spawn_rate_counter_cleanup(&state);
    let router = warden_server::build_router(state);

    let listener = tokio::net::TcpListener::bind(&listen).await?;
    info!(%listen, "warden API listening");
    axum::serve(listener, router).await?;
    Ok(())
}

fn cmd_check(loader: &ConfigLoader) -> warden_core::Result<()> {
    let warnings = loader
        .get()
        .validate()
        .map_err(warden_core::WardenError::Config)?;
    println!("config ok: {}", loader.path().display());
    for warning in &warnings {
        println!("warning: {warning}");
    }
    Ok(())
}

fn cmd_config(config: &WardenConfig, json: bool) -> warden_core::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(config)?);
    } else {
        let rendered = toml::to_string_pretty(config)
            .map_err(|e| warden_core::WardenError::Config(e.to_string()))?;
        println!("{rendered}");
    }
    Ok(())
}

fn cmd_version() -> warden_core::Result<()> {
    println!("warden {}", env!("CARGO_PKG_VERSION"));
    Ok(())
}
