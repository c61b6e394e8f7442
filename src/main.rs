//! Storefront API server.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http server (request ID, trace, body limit, timeout)
//!                         │
//!                         ▼
//!                     route pipeline
//!                     ┌──────────────────────────────────────────────────┐
//!                     │ error boundary → rate limit → auth → validation │
//!                     └──────────────────────────────────────────────────┘
//!                         │
//!                         ▼
//!                     handler ──▶ store (repositories) / cache
//!                         │
//!     Client Response     ▼
//!     ◀────────────── envelope or bare body
//!
//!     Cross-cutting: config · observability · lifecycle · security
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use storefront_api::config::{load_config, load_default};
use storefront_api::http::HttpServer;
use storefront_api::lifecycle::{build_state, shutdown_signal, spawn_background_tasks, Shutdown};
use storefront_api::observability::{logging, metrics};
use storefront_api::security::SystemClock;

#[derive(Parser)]
#[command(name = "storefront-api")]
#[command(about = "Storefront HTTP API", long_about = None)]
struct Cli {
    /// TOML config file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => load_default()?,
    };

    if cli.check {
        println!("Configuration OK");
        return Ok(());
    }

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "storefront-api starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        rate_limit_store = ?config.rate_limit.store,
        database_backend = ?config.database.backend,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let bind_address = config.listener.bind_address.clone();
    let state = build_state(config, Arc::new(SystemClock)).await?;

    let shutdown = Shutdown::new();
    let tasks = spawn_background_tasks(&state, &shutdown);

    let listener = TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let trigger = shutdown.clone();
    HttpServer::new(state)
        .run(listener, async move {
            shutdown_signal().await;
            trigger.trigger();
        })
        .await?;

    shutdown.trigger();
    for task in tasks {
        let _ = task.await;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
