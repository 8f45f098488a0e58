//! Main proxy server implementation

use axum::{
    extract::State,
    routing::{get, on, MethodFilter},
    Json, Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::handler::ProxyHandler;
use super::relay::build_upstream_client;
use crate::config::AppConfig;
use crate::notify::Notifier;

/// Display name reported by `GET /`
pub const SERVER_NAME: &str = "Claude Proxy Server";

/// Methods accepted on the proxy route
const PROXY_METHODS: MethodFilter = MethodFilter::GET
    .or(MethodFilter::POST)
    .or(MethodFilter::PUT)
    .or(MethodFilter::DELETE)
    .or(MethodFilter::PATCH);

/// Shared state for the proxy
#[derive(Clone)]
pub struct ProxyState {
    pub config: Arc<AppConfig>,
    /// Client for requests relayed in one piece
    pub buffered_client: reqwest::Client,
    /// Client for `"stream": true` requests
    pub streaming_client: reqwest::Client,
    pub notifier: Notifier,
}

impl ProxyState {
    /// Build clients and the ntfy notifier from configuration
    pub fn new(config: AppConfig) -> Result<Self, reqwest::Error> {
        let notifier = Notifier::from_config(&config.notify);
        Self::with_notifier(config, notifier)
    }

    /// Build clients with an explicitly supplied notifier
    pub fn with_notifier(config: AppConfig, notifier: Notifier) -> Result<Self, reqwest::Error> {
        let buffered_client = build_upstream_client(&config.upstream.buffered)?;
        let streaming_client = build_upstream_client(&config.upstream.streaming)?;

        Ok(Self {
            config: Arc::new(config),
            buffered_client,
            streaming_client,
            notifier,
        })
    }
}

/// Build the router with health, info and proxy routes
pub fn build_router(state: ProxyState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/api/anthropic/", on(PROXY_METHODS, proxy_handler))
        .route("/api/anthropic/*path", on(PROXY_METHODS, proxy_handler))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Run the proxy server until Ctrl-C or SIGTERM
pub async fn run_server(config: AppConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let state = ProxyState::new(config)?;

    tracing::info!("Proxying to {}", state.config.upstream.base_url());
    if state.notifier.is_configured() {
        tracing::info!(
            endpoint = ?state.config.notify.endpoint(),
            priority = %state.config.notify.priority,
            "ntfy notifications enabled"
        );
    } else {
        tracing::info!("ntfy notifications disabled (NTFY_TOPIC not set)");
    }

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("claude-proxy listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("claude-proxy stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining connections");
}

/// Health check endpoint
async fn health_handler(State(state): State<ProxyState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "proxy_target": state.config.upstream.base_url(),
    }))
}

/// Server info endpoint
async fn root_handler(State(state): State<ProxyState>) -> Json<Value> {
    Json(json!({
        "name": SERVER_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": {
            "health": "/health",
            "proxy": "/api/anthropic/*",
        },
        "environment": {
            "base_url": state.config.upstream.base_url(),
            "ntfy_configured": state.notifier.is_configured(),
        },
    }))
}

/// Main proxy handler for the wildcard route
async fn proxy_handler(
    State(state): State<ProxyState>,
    req: axum::extract::Request,
) -> axum::response::Response {
    let handler = ProxyHandler::new(state);
    handler.handle(req).await
}
