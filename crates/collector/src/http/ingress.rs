use axum::{
    Json, Router,
    body::Bytes,
    extract::{State, rejection::BytesRejection},
    http::{HeaderMap, StatusCode},
    routing::post,
};
use common::api::{CollectAck, CollectRequest};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{debug, warn};

use super::{AGENT_VERSION_HEADER, REQUEST_ID_HEADER};
use crate::{
    app_state::AppState,
    error::{ApiResult, AppError},
};

pub fn router(state: &AppState) -> Router<AppState> {
    let limit = usize::try_from(state.limits.collect_body_bytes).unwrap_or(usize::MAX);

    Router::<AppState>::new()
        .route("/api/collect_data", post(collect_data))
        .route("/api/v1/collect", post(collect_data))
        .layer(axum::extract::DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(limit))
}

async fn collect_data(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<(StatusCode, Json<CollectAck>)> {
    let request_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let agent_version = headers
        .get(AGENT_VERSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::payload_too_large(format!(
                "request body exceeds {} bytes",
                state.limits.collect_body_bytes
            ))
        } else {
            AppError::bad_request(rejection.body_text()).with_code("invalid_body")
        }
    })?;
    let request: CollectRequest = serde_json::from_slice(&body).map_err(|err| {
        AppError::bad_request(format!("invalid request body: {err}")).with_code("invalid_body")
    })?;

    let agent_id = request.agent_id.clone();
    let discovery_type = request.discovery_type.clone();
    match state.collector.store_event(request).await {
        Ok(event) => {
            debug!(
                %request_id,
                event_id = event.id,
                agent_id = %event.agent_id,
                discovery_type = %event.discovery_type,
                %agent_version,
                "discovery event accepted"
            );
            Ok((StatusCode::ACCEPTED, Json(CollectAck::ok())))
        }
        Err(err) => {
            warn!(
                %request_id,
                %agent_id,
                %discovery_type,
                %agent_version,
                reason = err.reason(),
                error = %err,
                "discovery event rejected"
            );
            Err(err.into())
        }
    }
}
