use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header::CONTENT_TYPE},
    response::IntoResponse,
    routing::get,
};
use common::api::HealthResponse;
use tracing::warn;

use crate::{app_state::AppState, persistence};

pub fn router() -> Router<AppState> {
    Router::<AppState>::new().route("/health", get(health))
}

pub fn metrics_router() -> Router<AppState> {
    Router::<AppState>::new().route("/metrics", get(metrics))
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database = persistence::ping(&state.db).await;
    let queue_depth = state.collector.queue().depth();
    if !database {
        warn!(queue_depth, "health check failed: database unreachable");
    }

    let (status, label) = if database {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };
    (
        status,
        Json(HealthResponse {
            status: label.to_string(),
            database,
            queue_depth,
        }),
    )
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics_handle.render(),
    )
}
