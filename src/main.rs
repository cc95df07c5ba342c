use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use nakadachi::config::Config;
use nakadachi::server::Server;

/// Nakadachi - forward HTTP/1.x caching proxy
#[derive(Parser, Debug)]
#[command(name = "nakadachi")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file; built-in defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    // all HTTP timestamps are exchanged in UTC
    std::env::set_var("TZ", "UTC");

    let args = Args::parse();

    nakadachi::logging::init_subscriber()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    tracing::info!(
        address = %config.listen_address(),
        threads = config.server.threads,
        cache_slots = config.cache.slots,
        "Starting proxy"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.threads)
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let server = Server::bind(&config).await?;
        let shutdown = server.shutdown_token();
        tokio::spawn(async move {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received");
            shutdown.cancel();
        });
        server.run().await;
        Ok::<(), anyhow::Error>(())
    })?;

    Ok(())
}

/// Completes on SIGINT or SIGTERM.
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}
