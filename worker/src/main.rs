use clap::Parser;
use tokio::net::TcpListener;

#[derive(Parser, Debug)]
#[command(name = "gauss-worker", about = "Gaussian elimination compute node")]
struct Args {
    /// TCP port to listen on
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let listener = TcpListener::bind(("0.0.0.0", args.port)).await?;

    tokio::select! {
        result = gauss_worker::serve(listener) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("worker shutting down"),
    }
    Ok(())
}
