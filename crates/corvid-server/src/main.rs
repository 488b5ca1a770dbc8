//! Corvid messaging server

use anyhow::Context;
use clap::{Parser, Subcommand};
use corvid_server::{Config, StreamServer};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Corvid - a small XMPP-style messaging server
#[derive(Parser)]
#[command(name = "corvid")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the server
    Run,

    /// Write a default configuration file
    GenerateConfig {
        /// Output file (defaults to the config path)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Validate the configuration and exit
    CheckConfig,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load(path),
        None => Config::load_or_default(),
    }
}

fn init_logging(verbose: bool, level: &str) {
    let default = if verbose { "debug" } else { level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run => {
            let config = load_config(cli.config.as_ref())?;
            init_logging(cli.verbose, &config.logging.level);
            config.validate().context("invalid configuration")?;

            let server = StreamServer::new(&config)?;
            tracing::info!(
                domain = %config.server.domain,
                accounts = config.accounts.users.len(),
                "Starting corvid"
            );
            server
                .run(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::error!("Cannot listen for ctrl-c: {}", e);
                        std::future::pending::<()>().await;
                    }
                })
                .await?;
        }
        Commands::GenerateConfig { output, force } => {
            let path = output
                .or(cli.config)
                .unwrap_or_else(Config::default_path);
            if path.exists() && !force {
                anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
            }
            Config::default().save(&path)?;
            println!("Wrote {}", path.display());
        }
        Commands::CheckConfig => {
            let config = load_config(cli.config.as_ref())?;
            config.validate()?;
            println!(
                "Configuration OK: domain {}, c2s {}, s2s {}",
                config.server.domain,
                config.server.c2s_addr,
                config.server.s2s_addr.as_deref().unwrap_or("disabled")
            );
        }
    }

    Ok(())
}
