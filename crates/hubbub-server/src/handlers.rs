//! HTTP server assembly for hubbub.
//!
//! Owns the shared [`AppState`], builds the axum router that mounts the three
//! realtime adapters and the REST endpoints, and runs it until shutdown.

use crate::api;
use crate::chat;
use crate::config::Config;
use crate::metrics;
use crate::push;
use crate::signal;
use anyhow::Result;
use axum::{
    extract::State,
    http::HeaderValue,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use hubbub_core::{clock, Hub, MessageStore};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Shared server state.
pub struct AppState {
    /// Live connection registry.
    pub hub: Hub,
    /// Per-user chat history.
    pub store: MessageStore,
    /// Server configuration.
    pub config: Config,
    /// Flipped to `true` once the server starts shutting down.
    pub shutdown: watch::Sender<bool>,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            hub: Hub::with_send_timeout(Duration::from_millis(config.http.send_timeout_ms)),
            store: MessageStore::with_history_limit(config.history.limit),
            config,
            shutdown,
        }
    }
}

/// Build the application router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let config = &state.config;

    let api_routes = Router::new()
        .route("/history/:user_id", get(api::history_handler))
        .route("/message", post(api::post_message_handler));

    let mut app = Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/ws/:user_id", get(chat::ws_handler))
        .route("/sse/:user_id", get(push::sse_handler))
        .route("/signal/:room_id", get(signal::ws_handler))
        .merge(api_routes.clone());

    if let Some(prefix) = normalize_prefix(&config.http.api_prefix) {
        app = app.nest(&prefix, api_routes);
    }

    if config.dev.reset_enabled {
        app = app.route("/__dev__/reset", post(api::reset_handler));
    }

    let cors = cors_layer(&config.cors.allowed_origins);

    app.layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Turn a configured prefix into a nestable path, or `None` for no prefix.
fn normalize_prefix(prefix: &str) -> Option<String> {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        None
    } else {
        Some(format!("/{trimmed}"))
    }
}

/// CORS for the configured origins. Credentials are allowed, so a `*` entry
/// mirrors the request origin instead of answering with a wildcard.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|origin| origin == "*") {
        AllowOrigin::mirror_request()
    } else {
        let values: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %origin, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(values)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

/// Run the HTTP server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let state = Arc::new(AppState::new(config));
    let app = build_router(Arc::clone(&state));

    // Bind and serve
    let listener = TcpListener::bind(addr).await?;

    info!("hubbub listening on {}", addr);
    info!("Chat endpoint: ws://{}/ws/{{user_id}}", addr);
    info!("Push endpoint: http://{}/sse/{{user_id}}", addr);
    info!("Signaling endpoint: ws://{}/signal/{{room_id}}", addr);

    let shutdown_state = Arc::clone(&state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_signal().await;
        shutdown_state.shutdown.send_replace(true);
    })
    .await?;

    info!("hubbub stopped");
    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
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
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("Shutdown signal received");
}

/// Liveness probe.
async fn root_handler() -> impl IntoResponse {
    Json(json!({
        "ok": true,
        "service": "hubbub",
        "time": clock::utc_now(),
    }))
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": state.hub.stats(),
        "history_users": state.store.user_count(),
    }))
}
