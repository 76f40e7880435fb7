use std::sync::Arc;

use async_trait::async_trait;
use common::{DiscoveryPayload, DiscoveryType};

use crate::{config::AppConfig, identity::AgentIdentity};

pub mod cloud;
pub mod cluster;
pub mod cluster_source;
pub mod command;
pub mod host;
pub mod sap_system;
pub mod subscription;

/// Result of one discovery pass.
///
/// `payload` is `None` when the probe found nothing worth publishing (for
/// example no cluster on this host); that is not an error.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub summary: String,
    pub payload: Option<DiscoveryPayload>,
}

impl ProbeOutcome {
    pub fn found(summary: impl Into<String>, payload: DiscoveryPayload) -> Self {
        Self {
            summary: summary.into(),
            payload: Some(payload),
        }
    }

    pub fn absent(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            payload: None,
        }
    }
}

#[async_trait]
pub trait DiscoveryProbe: Send + Sync {
    fn discovery_type(&self) -> DiscoveryType;

    async fn discover(&self) -> anyhow::Result<ProbeOutcome>;
}

pub type DynProbe = Arc<dyn DiscoveryProbe>;

/// Production probe set, in the order they run on every tick.
pub fn default_probes(cfg: &AppConfig, identity: &AgentIdentity) -> anyhow::Result<Vec<DynProbe>> {
    let cluster_source = cluster_source::LocalClusterSource::new(&cfg.cluster, cfg.command_timeout());
    let cloud_detector = cloud::CloudDetector::from_config(&cfg.cloud, cfg.command_timeout())?;

    Ok(vec![
        Arc::new(cluster::ClusterProbe::new(
            Arc::new(cluster_source),
            identity.hostname.clone(),
        )),
        Arc::new(sap_system::SapSystemsProbe::new(&cfg.sap.install_root)),
        Arc::new(cloud::CloudProbe::new(cloud_detector)),
        Arc::new(subscription::SubscriptionProbe::new(
            &cfg.subscription.suseconnect_path,
            cfg.command_timeout(),
        )),
        Arc::new(host::HostProbe::new(identity, &cfg.ssh_address)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{base_config, test_identity};

    #[test]
    fn default_probes_keep_registration_order() {
        let probes = default_probes(&base_config(), &test_identity()).expect("probes");
        let order: Vec<_> = probes.iter().map(|p| p.discovery_type()).collect();
        assert_eq!(order, DiscoveryType::ALL.to_vec());
    }
}
