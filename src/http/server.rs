//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the todos handler
//! - Wire up middleware (request ID, tracing, duration observer)
//! - Build collaborators and pipeline from configuration
//! - Serve until shutdown

use std::sync::Arc;
use std::time::Duration;

use axum::{middleware, routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::collaborators::{build_store, HttpAuthClient, KeyValueStore};
use crate::config::ServiceConfig;
use crate::http::observer::record_http_calls;
use crate::http::todos::list_todos;
use crate::observability::metrics::{DurationRecorder, HistogramRecorder};
use crate::pipeline::{Aggregator, FaultInjector, TodoPipeline};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<TodoPipeline>,
    pub recorder: Arc<dyn DurationRecorder>,
}

impl AppState {
    pub fn new(pipeline: TodoPipeline, recorder: Arc<dyn DurationRecorder>) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            recorder,
        }
    }

    /// Wire the production collaborators. Returns the store so it can be
    /// seeded.
    pub fn from_config(config: &ServiceConfig) -> (Self, Arc<dyn KeyValueStore>) {
        let store = build_store(&config.store);
        let aggregator = Aggregator::new(
            Arc::new(HttpAuthClient::new(config.auth.url.clone())),
            store.clone(),
            config.store.key_pattern.clone(),
        );
        let injector = FaultInjector::new(Duration::from_millis(config.faults.slow_delay_ms));
        let state = Self::new(
            TodoPipeline::new(aggregator, injector),
            Arc::new(HistogramRecorder),
        );
        (state, store)
    }
}

/// Build the Axum router with all middleware layers.
pub fn build_router(state: AppState) -> Router {
    let recorder = state.recorder.clone();
    Router::new()
        .route("/todos", get(list_todos))
        .with_state(state)
        .layer(middleware::from_fn_with_state(recorder, record_http_calls))
        .layer(PropagateRequestIdLayer::x_request_id())
        // 5xx are reported by the response writer with trace identity
        .layer(TraceLayer::new_for_http().on_failure(()))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

/// HTTP server for the todo service.
pub struct HttpServer {
    router: Router,
    config: ServiceConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration and state.
    pub fn new(config: ServiceConfig, state: AppState) -> Self {
        let router = build_router(state);
        Self { router, config }
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal(shutdown))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }
}

/// Wait for Ctrl+C or an explicit shutdown trigger.
async fn shutdown_signal(mut shutdown: broadcast::Receiver<()>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = ctrl_c => {}
        _ = shutdown.recv() => {}
    }
    tracing::info!("Shutdown signal received");
}
