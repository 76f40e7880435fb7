use axum::http::Request;
use common::DiscoveryType;
use metrics::{counter, gauge};
use sqlx::Error as SqlxError;
use tower_http::request_id::RequestId;

pub(crate) fn request_id_from_request<B>(req: &Request<B>) -> Option<String> {
    req.extensions()
        .get::<RequestId>()
        .and_then(|id| id.header_value().to_str().ok())
        .map(str::to_string)
}

pub(crate) fn record_internal_error_metrics(err: &anyhow::Error) {
    counter!("collector_internal_errors_total").increment(1);
    if let Some(db_err) = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<SqlxError>())
    {
        let kind = match db_err {
            SqlxError::RowNotFound => "row_not_found",
            SqlxError::Database(_) => "database",
            SqlxError::Io(_) => "io",
            SqlxError::PoolTimedOut | SqlxError::PoolClosed => "pool",
            _ => "other",
        };
        counter!("collector_db_errors_total", "kind" => kind).increment(1);
    }
}

pub fn record_event_stored(discovery_type: DiscoveryType) {
    counter!(
        "collector_events_stored_total",
        "discovery_type" => discovery_type.as_str()
    )
    .increment(1);
}

/// Events refused before anything was written.
pub fn record_event_rejected(reason: &'static str) {
    counter!("collector_events_rejected_total", "reason" => reason).increment(1);
}

/// Events stored but not handed to the projectors; startup replay picks
/// them up.
pub fn record_event_unqueued(discovery_type: DiscoveryType) {
    counter!(
        "collector_events_unqueued_total",
        "discovery_type" => discovery_type.as_str()
    )
    .increment(1);
}

/// `result` is one of `success`, `error`, `stale`, `unhandled`.
pub fn record_projection(discovery_type: DiscoveryType, result: &'static str) {
    counter!(
        "collector_projections_total",
        "discovery_type" => discovery_type.as_str(),
        "result" => result
    )
    .increment(1);
}

pub fn record_queue_depth(depth: usize) {
    gauge!("collector_projector_queue_depth").set(depth as f64);
}
