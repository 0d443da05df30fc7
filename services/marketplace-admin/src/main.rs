//! Marketplace admin service
//!
//! Single-binary service that:
//! 1. Loads configuration and the admin token
//! 2. Wires the marketplace client to an HTTP transport and a file-backed
//!    license key store
//! 3. Serves the admin API plus /health and /metrics

mod admin;
mod config;
mod metrics;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use marketplace_api::{
    AllowedDomains, FileLicenseKeyStore, HttpTransport, MarketplaceApi, StaticAccess,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::admin::AdminState;
use crate::config::Config;

/// Upper bound on waiting for in-flight requests after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// State for the service-level routes
#[derive(Clone)]
struct AppState {
    started_at: Instant,
    prometheus: PrometheusHandle,
}

/// Build the full router: admin API plus health and metrics.
///
/// Applies a concurrency limit layer based on `max_connections`.
fn build_router(admin: AdminState, state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .merge(admin::build_admin_router(admin))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
}

/// Wire the orchestrator from configuration.
///
/// The default access guard denies everything; the admin router swaps in
/// the caller's privilege per request.
fn build_api(config: &Config) -> Result<MarketplaceApi> {
    let client = reqwest::Client::builder()
        .build()
        .context("failed to build HTTP client")?;
    let transport = HttpTransport::new(
        client,
        config.marketplace.api_url.clone(),
        Duration::from_secs(config.marketplace.timeout_secs),
    );
    let store = FileLicenseKeyStore::new(config.storage.license_key_path.clone());
    let domains = AllowedDomains::from_config(Some(&config.accounts.allowed_email_domains));

    Ok(MarketplaceApi::new(
        Arc::new(transport),
        Arc::new(store),
        Arc::new(StaticAccess::denied()),
        Arc::new(domains),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting marketplace-admin");

    let prometheus = metrics::install_recorder();

    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.admin.listen_addr,
        api_url = %config.marketplace.api_url,
        license_key_path = %config.storage.license_key_path.display(),
        allowed_domains = config.accounts.allowed_email_domains.len(),
        "configuration loaded"
    );

    if config.admin.admin_token.is_none() {
        warn!("no admin token configured, every privileged request will be denied");
    }

    let api = build_api(&config)?;
    let admin_state = AdminState::new(api, config.admin.admin_token.clone());
    let app_state = AppState {
        started_at: Instant::now(),
        prometheus,
    };
    let app = build_router(admin_state, app_state, config.admin.max_connections);

    let listen_addr = config.admin.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => info!("all in-flight requests drained"),
        Ok(Ok(Err(e))) => error!(error = %e, "server error during shutdown"),
        Ok(Err(e)) => error!(error = %e, "server task panicked"),
        Err(_) => warn!(
            drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
            "drain timeout exceeded, forcing shutdown"
        ),
    }

    info!("shutdown complete");
    Ok(())
}

/// Liveness only; does not call the marketplace.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        serde_json::json!({
            "status": "healthy",
            "uptime_seconds": state.started_at.elapsed().as_secs(),
        })
        .to_string(),
    )
}

/// Prometheus metrics endpoint in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
