//! E-learning Session Proxy
//!
//! Single-binary Rust service that:
//! 1. Holds the signed-in user's access and renewal tokens
//! 2. Listens for requests from the e-learning front end
//! 3. Forwards them to the backend with the current access token
//! 4. Renews the session once when the token expires, however many
//!    requests notice at the same time, and replays them

mod config;
mod error;
mod metrics;
mod proxy;
mod session;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use metrics_exporter_prometheus::PrometheusHandle;
use session_auth::CredentialStore;
use session_refresh::{AuthenticatedClient, RefreshCoordinator, RefreshOptions};
use transport::{HttpTransport, Transport};

use crate::config::{Config, SessionConfig};
use crate::metrics::ServiceMetrics;
use crate::proxy::ProxyState;
use crate::session::SessionState;

/// How long in-flight requests get to finish after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    proxy: ProxyState,
    session: SessionState,
    metrics: ServiceMetrics,
    prometheus: PrometheusHandle,
}

/// Build the axum router with all routes and shared state.
///
/// Anything that is not a reserved route is forwarded to the backend.
fn build_router(state: AppState, max_connections: usize) -> Router {
    let session_routes = session::router(state.session.clone());
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .fallback(proxy_handler)
        .with_state(state)
        .merge(session_routes)
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
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

    info!("starting elearning-session-proxy");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle =
        metrics::install_recorder().context("failed to install Prometheus recorder")?;

    // CLI: simple --config flag parsing
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
        listen_addr = %config.proxy.listen_addr,
        base_url = %config.backend.base_url,
        credentials_file = ?config.session.credentials_file,
        sign_in_route = %config.session.sign_in_route,
        "configuration loaded"
    );

    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(
        reqwest::Client::new(),
        config.backend.base_url.clone(),
        Duration::from_secs(config.backend.timeout_secs),
    ));

    let store = match &config.session.credentials_file {
        Some(path) => CredentialStore::load(path.clone())
            .await
            .with_context(|| format!("failed to load credentials from {}", path.display()))?,
        None => CredentialStore::in_memory(),
    };

    let coordinator = RefreshCoordinator::new(
        transport,
        Arc::new(store),
        config.endpoints.clone(),
        RefreshOptions {
            renewal_timeout: Duration::from_secs(config.session.renewal_timeout_secs),
            sign_in_route: config.session.sign_in_route.clone(),
        },
    );
    let client = AuthenticatedClient::new(coordinator);

    startup_sign_in(&client, &config.session).await;

    let metrics = ServiceMetrics::new();
    let session = SessionState::new(client.clone());
    let _event_watcher = session.spawn_event_watcher();

    let app_state = AppState {
        proxy: ProxyState {
            client,
            requests_total: metrics.requests_total.clone(),
            errors_total: metrics.errors_total.clone(),
            in_flight: metrics.in_flight.clone(),
        },
        session,
        metrics: metrics.clone(),
        prometheus: prometheus_handle,
    };

    let app = build_router(app_state, config.proxy.max_connections);

    let listen_addr = config.proxy.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    let in_flight = metrics.in_flight.clone();

    // The drain timeout starts when the shutdown signal fires, not when the
    // server starts: signal the server to drain, then race it against the
    // timeout.
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
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            let remaining = in_flight.load(Ordering::Relaxed);
            warn!(
                remaining,
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// Sign in with the configured account unless a persisted session exists.
///
/// Failures are logged and the proxy starts signed out; the front end can
/// still sign in through `/session/login`.
async fn startup_sign_in(client: &AuthenticatedClient, session: &SessionConfig) {
    let Some(email) = session.email.as_deref() else {
        return;
    };
    let coordinator = client.coordinator();

    if coordinator.store().is_signed_in().await {
        info!(email, "resuming persisted session, skipping startup sign-in");
        return;
    }

    let Some(password) = &session.password else {
        warn!(
            email,
            "session.email is set but no password found in SESSION_PASSWORD or session.password_file"
        );
        return;
    };

    let result = session_auth::sign_in(
        coordinator.transport().as_ref(),
        coordinator.endpoints(),
        email,
        password.expose(),
    )
    .await;

    match result {
        Ok(auth) => match coordinator.store().set(auth.into()).await {
            Ok(()) => info!(email, "startup sign-in succeeded"),
            Err(e) => warn!(email, error = %e, "signed in but failed to persist credentials"),
        },
        Err(e) => warn!(email, error = %e, "startup sign-in failed, starting signed out"),
    }
}

/// Health endpoint: status, session state, uptime, requests served.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.metrics.started_at.elapsed().as_secs();
    let requests = state.metrics.requests_total.load(Ordering::Relaxed);
    let errors = state.metrics.errors_total.load(Ordering::Relaxed);
    let coordinator = state.proxy.client.coordinator();

    let body = serde_json::json!({
        "status": "healthy",
        "signed_in": state.session.is_signed_in().await,
        "refresh_state": coordinator.state().await.label(),
        "uptime_seconds": uptime,
        "requests_served": requests,
        "errors_total": errors,
    });

    (
        axum::http::StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
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

/// Catch-all handler that forwards everything else to the backend.
async fn proxy_handler(
    State(state): State<AppState>,
    request: axum::http::Request<axum::body::Body>,
) -> Response {
    proxy::proxy_request(&state.proxy, request, error::request_id()).await
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
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
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
