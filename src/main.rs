//! Redirect proxy
//!
//! ```text
//!                       ┌──────────────────────────────────────────────┐
//!                       │                REDIRECT PROXY                │
//!     Client Request    │  ┌──────────┐   ┌──────────┐   ┌──────────┐  │
//!     ──────────────────┼─▶│  http    │──▶│ redirect │──▶│ routing  │  │
//!                       │  │ server   │   │ (store)  │   │          │  │
//!                       │  └──────────┘   └────┬─────┘   └────┬─────┘  │
//!                       │                 308 ◀┘              │        │
//!                       │                          ┌──────────┴─────┐  │
//!                       │                          ▼                ▼  │
//!                       │                  ┌─────────────┐  ┌────────┐ │
//!                       │                  │ alternative │─▶│forward │─┼──▶ Upstreams
//!                       │                  │ (releases)  │  │        │ │
//!                       │                  └─────────────┘  └────────┘ │
//!                       │  config · health · lifecycle · observability │
//!                       └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::sync::mpsc;

use redirect_proxy::config::{loader, watcher::ConfigWatcher, ProxyConfig};
use redirect_proxy::lifecycle::{signals, RedisInitialiser, Service, StopReason};
use redirect_proxy::observability::logging;

#[derive(Parser, Debug)]
#[command(name = "redirect-proxy", version, about = "HTTP redirect and fallback proxy")]
struct Cli {
    /// Path to a TOML config file. Environment variables override it.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config: ProxyConfig = match &cli.config {
        Some(path) => loader::load_config(path)?,
        None => loader::from_env()?,
    };

    logging::init(&config.observability)?;
    tracing::info!(
        config = ?cli.config,
        bind_address = %config.listener.bind_address,
        primary = %config.upstreams.primary_url,
        "Configuration loaded"
    );

    let (errors_tx, mut errors_rx) = mpsc::unbounded_channel();
    let service = Service::run(config.clone(), &RedisInitialiser, errors_tx).await?;

    // keep the watcher alive for the life of the process
    let (_watcher, reloads) = match &cli.config {
        Some(path) => {
            let (watcher, rx) = ConfigWatcher::new(path, config);
            (Some(watcher.run()?), Some(rx))
        }
        None => (None, None),
    };

    let mut failed = false;
    match service
        .serve_until(signals::shutdown_signal(), &mut errors_rx, reloads)
        .await?
    {
        StopReason::Signal(signal) => tracing::info!(signal, "Shutdown signal received"),
        StopReason::Failed(err) => {
            tracing::error!(error = %err, "Service error, shutting down");
            failed = true;
        }
    }

    if let Err(e) = service.close().await {
        tracing::error!(error = %e, "Shutdown incomplete");
        failed = true;
    }

    if failed {
        std::process::exit(1);
    }
    tracing::info!("Shutdown complete");
    Ok(())
}
