use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;

use axum::{Router, http::StatusCode, routing::get};
use common::DiscoveryType;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::liveness::{self, CheckStatus, LivenessState};

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json())
        .init();
}

pub fn init_metrics_recorder() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .expect("metrics recorder already installed")
        })
        .clone()
}

/// Register an existing Prometheus handle without installing a new recorder.
/// Useful when embedding the agent into another binary that already installed
/// a global recorder.
pub fn register_metrics_handle(handle: PrometheusHandle) -> PrometheusHandle {
    METRICS_HANDLE.get_or_init(|| handle).clone()
}

/// `/metrics` (Prometheus text) and `/health` (liveness check JSON).
pub fn metrics_router(handle: PrometheusHandle, liveness: LivenessState) -> Router {
    Router::new()
        .route(
            "/metrics",
            get(move || {
                let body = handle.render();
                async move {
                    (
                        StatusCode::OK,
                        [(
                            axum::http::header::CONTENT_TYPE,
                            "text/plain; version=0.0.4",
                        )],
                        body,
                    )
                }
            }),
        )
        .route("/health", get(liveness::health_handler))
        .with_state(liveness)
}

pub async fn serve_metrics_with_shutdown<S>(
    handle: PrometheusHandle,
    liveness: LivenessState,
    addr: SocketAddr,
    shutdown: S,
) -> anyhow::Result<()>
where
    S: std::future::Future<Output = ()> + Send + 'static,
{
    let app = metrics_router(handle, liveness);

    let listener = TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr().unwrap_or(addr);
    info!(%bound_addr, "metrics server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

pub fn record_probe_run(discovery_type: DiscoveryType, result: &str) {
    counter!(
        "discovery_agent_probe_runs_total",
        "discovery_type" => discovery_type.as_str(),
        "result" => result.to_string()
    )
    .increment(1);
}

pub fn record_publish(discovery_type: DiscoveryType, result: &str) {
    counter!(
        "discovery_agent_publish_total",
        "discovery_type" => discovery_type.as_str(),
        "result" => result.to_string()
    )
    .increment(1);
}

pub fn record_tick_duration(duration: Duration) {
    histogram!("discovery_agent_tick_duration_ms").record(duration.as_secs_f64() * 1000.0);
}

/// 0 passing, 1 warning, 2 critical.
pub fn record_liveness_status(status: CheckStatus) {
    let value = match status {
        CheckStatus::Passing => 0.0,
        CheckStatus::Warning => 1.0,
        CheckStatus::Critical => 2.0,
    };
    gauge!("discovery_agent_liveness_status").set(value);
}
