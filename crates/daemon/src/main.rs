//! ProveNet Coordinator Binary
//!
//! Runs the on-chain state tracker, the task dispatcher and the HTTP
//! ingress as one process.

use clap::Parser;
use provenet_core::CoordinatorConfig;
use provenet_daemon::{Coordinator, DaemonError};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "coordinator.json")]
    config: String,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,provenet=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), DaemonError> {
    init_logging();

    let args = Args::parse();

    tracing::info!("Starting ProveNet coordinator...");

    let config = CoordinatorConfig::load(&args.config)?;
    let coordinator = Coordinator::start(config).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal");
    coordinator.stop().await;

    tracing::info!("Coordinator stopped");
    Ok(())
}
