use metrics_exporter_prometheus::PrometheusHandle;

use crate::{config::LimitsConfig, persistence, services::CollectorService};

/// Shared application state passed into handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: persistence::Db,
    pub collector: CollectorService,
    pub limits: LimitsConfig,
    pub metrics_handle: PrometheusHandle,
}
