use std::path::PathBuf;

use clap::Parser;
use gauss_server::{logging, Config, Coordinator};

/// Distributed Gaussian elimination coordinator
#[derive(Parser, Debug)]
#[command(name = "gauss-server", version)]
struct Cli {
    /// Configuration file path; defaults apply when it does not exist
    #[arg(short, long, default_value = "gauss-server.toml")]
    config: PathBuf,

    /// Override the listen address
    #[arg(short, long)]
    listen: Option<String>,

    /// Override the log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_or_default(&cli.config)?;
    if let Some(listen) = cli.listen {
        config.server.listen_addr = listen;
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    config.validate()?;
    logging::init(&config.logging, cli.log_level.as_deref())?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %config.server.listen_addr,
        workers_host = %config.workers.host,
        base_port = config.workers.base_port,
        partition = ?config.solver.partition,
        "starting coordinator"
    );

    let coordinator = Coordinator::bind(config).await?;
    tokio::signal::ctrl_c().await?;
    tracing::info!("received shutdown signal");
    coordinator.shutdown().await;
    Ok(())
}
