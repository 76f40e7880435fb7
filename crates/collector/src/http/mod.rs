use axum::{Router, body::Body, http::Request};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::{
    app_state::AppState,
    error::{ApiResult, AppError},
    metrics::HttpMetricsLayer,
    telemetry,
};

mod agents;
mod clusters;
mod error_mapper;
mod hosts;
mod ingress;
mod system;

pub const AGENT_VERSION_HEADER: &str = "x-agent-version";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn build_router(state: AppState) -> Router<AppState> {
    let middleware_stack = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
            let request_id = telemetry::request_id_from_request(req).unwrap_or_default();
            tracing::info_span!(
                "http_request",
                method = %req.method(),
                uri = %req.uri(),
                %request_id
            )
        }))
        .layer(HttpMetricsLayer);

    Router::<AppState>::new()
        .merge(ingress::router(&state))
        .merge(clusters::router())
        .merge(hosts::router())
        .merge(agents::router())
        .merge(system::router())
        .layer(middleware_stack)
}

pub fn build_metrics_router() -> Router<AppState> {
    system::metrics_router()
}

/// Query string of the list endpoints, kept as ordered pairs so filters can repeat.
#[derive(Debug)]
pub(crate) struct ListQuery {
    pairs: Vec<(String, String)>,
}

impl ListQuery {
    pub(crate) fn new(pairs: Vec<(String, String)>) -> Self {
        Self { pairs }
    }

    /// Every non-empty value given for `key`.
    pub(crate) fn values(&self, key: &str) -> Vec<String> {
        self.pairs
            .iter()
            .filter(|(name, value)| name == key && !value.trim().is_empty())
            .map(|(_, value)| value.trim().to_string())
            .collect()
    }

    pub(crate) fn limit(&self, max: u32) -> ApiResult<u32> {
        let limit = match self.values("limit").last() {
            Some(raw) => raw
                .parse::<u32>()
                .map_err(|_| AppError::bad_request("limit must be a positive integer"))?,
            None => max,
        };
        if limit == 0 || limit > max {
            return Err(AppError::bad_request(format!(
                "limit must be between 1 and {max}"
            )));
        }
        Ok(limit)
    }
}
