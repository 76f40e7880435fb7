use std::time::Instant;

use common::DiscoveryType;
use tracing::{debug, error, warn};

use crate::{
    collector_client::DynPublisher,
    liveness::CheckStatus,
    probes::{DynProbe, ProbeOutcome},
    telemetry,
};

/// Line reported for one probe in a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub discovery_type: DiscoveryType,
    pub line: String,
    pub ok: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub entries: Vec<ProbeReport>,
    pub status: CheckStatus,
}

impl TickReport {
    /// Liveness narrative: every probe line, in registration order.
    pub fn output(&self) -> String {
        self.entries
            .iter()
            .map(|entry| entry.line.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

pub fn error_line(discovery_type: DiscoveryType, err: impl std::fmt::Display) -> String {
    format!("Error while running discovery '{discovery_type}': {err}")
}

/// Runs the registered probes one after the other and publishes their payloads.
pub struct DiscoveryScheduler {
    probes: Vec<DynProbe>,
    publisher: DynPublisher,
}

impl DiscoveryScheduler {
    pub fn new(probes: Vec<DynProbe>, publisher: DynPublisher) -> Self {
        Self { probes, publisher }
    }

    pub fn discovery_types(&self) -> Vec<DiscoveryType> {
        self.probes.iter().map(|p| p.discovery_type()).collect()
    }

    pub async fn run_tick(&self) -> TickReport {
        let started = Instant::now();
        let mut entries = Vec::with_capacity(self.probes.len());

        for probe in &self.probes {
            let discovery_type = probe.discovery_type();
            let entry = match run_probe(probe.clone()).await {
                Ok(outcome) => {
                    telemetry::record_probe_run(discovery_type, "success");
                    self.publish(discovery_type, outcome).await
                }
                Err(err) => {
                    telemetry::record_probe_run(discovery_type, "error");
                    error!(%discovery_type, error = %err, "discovery failed");
                    ProbeReport {
                        discovery_type,
                        line: error_line(discovery_type, err),
                        ok: false,
                    }
                }
            };
            entries.push(entry);
        }

        let status = if entries.iter().all(|entry| entry.ok) {
            CheckStatus::Passing
        } else {
            CheckStatus::Critical
        };
        telemetry::record_tick_duration(started.elapsed());
        debug!(%status, probes = entries.len(), "discovery tick finished");

        TickReport { entries, status }
    }

    async fn publish(&self, discovery_type: DiscoveryType, outcome: ProbeOutcome) -> ProbeReport {
        let Some(payload) = outcome.payload else {
            return ProbeReport {
                discovery_type,
                line: outcome.summary,
                ok: true,
            };
        };

        match self.publisher.publish(discovery_type, &payload).await {
            Ok(()) => {
                telemetry::record_publish(discovery_type, "success");
                ProbeReport {
                    discovery_type,
                    line: outcome.summary,
                    ok: true,
                }
            }
            Err(err) => {
                telemetry::record_publish(discovery_type, "error");
                warn!(%discovery_type, error = %err, "failed to publish discovery");
                ProbeReport {
                    discovery_type,
                    line: error_line(discovery_type, &err),
                    ok: false,
                }
            }
        }
    }
}

/// Runs a probe on its own task so a panic surfaces as an error.
async fn run_probe(probe: DynProbe) -> Result<ProbeOutcome, String> {
    match tokio::spawn(async move { probe.discover().await }).await {
        Ok(Ok(outcome)) => Ok(outcome),
        Ok(Err(err)) => Err(format!("{err:#}")),
        Err(join_err) if join_err.is_panic() => Err("probe panicked".to_string()),
        Err(join_err) => Err(join_err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        collector_client::DynPublisher,
        probes::DynProbe,
        test_support::{FakeProbe, RecordingPublisher},
    };

    fn scheduler(probes: Vec<DynProbe>, publisher: RecordingPublisher) -> DiscoveryScheduler {
        DiscoveryScheduler::new(probes, Arc::new(publisher) as DynPublisher)
    }

    #[tokio::test]
    async fn failing_probe_does_not_stop_the_others() {
        let cluster = FakeProbe::failing(DiscoveryType::Cluster, "crm_mon exploded");
        let cloud = FakeProbe::found(DiscoveryType::Cloud, "Cloud provider aws discovered");
        let host = FakeProbe::found(DiscoveryType::Host, "Host with name: vmhana01 successfully discovered");
        let publisher = RecordingPublisher::default();
        let scheduler = scheduler(
            vec![
                Arc::new(cluster.clone()),
                Arc::new(cloud.clone()),
                Arc::new(host.clone()),
            ],
            publisher.clone(),
        );

        let report = scheduler.run_tick().await;

        assert_eq!(report.status, CheckStatus::Critical);
        assert_eq!(cluster.calls(), 1);
        assert_eq!(cloud.calls(), 1);
        assert_eq!(host.calls(), 1);
        assert_eq!(
            report.entries[0].line,
            "Error while running discovery 'cluster_discovery': crm_mon exploded"
        );
        assert!(report.output().contains("crm_mon exploded"));
        assert_eq!(
            publisher.published(),
            vec![DiscoveryType::Cloud, DiscoveryType::Host]
        );
    }

    #[tokio::test]
    async fn panicking_probe_is_reported_as_error() {
        let panicking = FakeProbe::panicking(DiscoveryType::SapSystems);
        let host = FakeProbe::found(DiscoveryType::Host, "host ok");
        let scheduler = scheduler(
            vec![Arc::new(panicking), Arc::new(host.clone())],
            RecordingPublisher::default(),
        );

        let report = scheduler.run_tick().await;

        assert_eq!(report.status, CheckStatus::Critical);
        assert!(!report.entries[0].ok);
        assert!(report.entries[0].line.starts_with("Error while running discovery 'sap_discovery'"));
        assert_eq!(host.calls(), 1);
    }

    #[tokio::test]
    async fn all_successful_probes_pass_and_join_summaries() {
        let scheduler = scheduler(
            vec![
                Arc::new(FakeProbe::absent(DiscoveryType::Cluster, "No HA cluster discovered on this host")),
                Arc::new(FakeProbe::found(DiscoveryType::Host, "host ok")),
            ],
            RecordingPublisher::default(),
        );

        let report = scheduler.run_tick().await;

        assert_eq!(report.status, CheckStatus::Passing);
        assert_eq!(
            report.output(),
            "No HA cluster discovered on this host\n\nhost ok"
        );
    }

    #[tokio::test]
    async fn absent_outcome_is_not_published() {
        let publisher = RecordingPublisher::default();
        let scheduler = scheduler(
            vec![Arc::new(FakeProbe::absent(DiscoveryType::Cluster, "none"))],
            publisher.clone(),
        );

        scheduler.run_tick().await;
        assert!(publisher.published().is_empty());
    }

    #[tokio::test]
    async fn publish_failure_turns_tick_critical() {
        let publisher = RecordingPublisher::rejecting();
        let scheduler = scheduler(
            vec![Arc::new(FakeProbe::found(DiscoveryType::Host, "host ok"))],
            publisher,
        );

        let report = scheduler.run_tick().await;

        assert_eq!(report.status, CheckStatus::Critical);
        assert!(report.entries[0].line.starts_with("Error while running discovery 'host_discovery'"));
        assert!(report.entries[0].line.contains("host_discovery"));
    }
}
