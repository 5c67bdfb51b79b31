//! Metrics and health HTTP endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use indexer_bus::EventBus;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

#[derive(Clone)]
struct AppState {
    bus: Arc<dyn EventBus>,
}

/// Start the metrics server in the background. Returns the task handle so
/// shutdown can abort it.
pub async fn start_metrics_server(
    port: u16,
    bus: Arc<dyn EventBus>,
) -> anyhow::Result<JoinHandle<()>> {
    let state = AppState { bus };
    let router = Router::new()
        .route("/metrics", get(serve_metrics))
        .route("/health", get(serve_health))
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "metrics server listening");

    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!(error = %e, "metrics server error");
        }
    }))
}

async fn serve_metrics() -> impl IntoResponse {
    match indexer_telemetry::encode_metrics() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("metrics encoding failed: {e}"),
        ),
    }
}

async fn serve_health(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.bus.health_status();
    let healthy = state.bus.healthy();
    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        code,
        Json(serde_json::json!({
            "healthy": healthy,
            "bus": status,
            "stats": state.bus.stats(),
        })),
    )
}
