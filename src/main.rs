use anyhow::Result;
use clap::{Parser, Subcommand};
use evolane::config::Config;
use evolane::daemon;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(
    name = "evolane",
    about = "Consent-gated evolution-turn coordinator with a resilient ledger RPC channel"
)]
struct Cli {
    /// Path to config.toml (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the evolution-turn loop and ledger channel
    Run,
    /// Probe the ledger and context endpoints
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install default crypto provider for Rustls TLS before any wss:// dial.
    if let Err(e) = rustls::crypto::ring::default_provider().install_default() {
        eprintln!("Warning: Failed to install default crypto provider: {e:?}");
    }

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let cli = Cli::parse();
    let config = Config::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Command::Run => daemon::Daemon::start(config).run().await,
        Command::Doctor => daemon::doctor(&config).await,
    }
}
