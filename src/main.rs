//! Todo service.
//!
//! Serves `GET /todos`, aggregating the auth collaborator's user payload with
//! the todos held in a key-value store, under a per-request trace context.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request        ┌──────────────────────────────────────────────┐
//!     ──────────────────────┼─▶ observer ─▶ handler ─▶ pipeline            │
//!                           │   (http-calls)            │                  │
//!                           │                           ├─▶ auth ──────────┼──▶ Auth service
//!                           │                           ├─▶ store ─────────┼──▶ Redis
//!                           │                           └─▶ fault injector │
//!     Client Response       │                                              │
//!     ◀─────────────────────┼── response writer (200 JSON / bare 500)      │
//!                           └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use todo_service::config::{load_config, ServiceConfig};
use todo_service::http::{AppState, HttpServer};
use todo_service::lifecycle::{seed_defaults, Shutdown};
use todo_service::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "todo-service")]
#[command(about = "Instrumented todo aggregation service", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServiceConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    logging::init_logging(&config.observability);
    tracing::info!("todo-service v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        auth_url = %config.auth.url,
        store_backend = ?config.store.backend,
        slow_delay_ms = config.faults.slow_delay_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let (state, store) = AppState::from_config(&config);

    if config.store.seed {
        if let Err(e) = seed_defaults(store.as_ref()).await {
            tracing::error!(error = %e, "Failed to seed default todos");
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, state);
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
