use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use common::{DiscoveryPayload, DiscoveryType, cluster::ClusterSnapshot};
use md5::{Digest, Md5};
use tracing::debug;

use super::{DiscoveryProbe, ProbeOutcome, cluster_source::ClusterSource};

pub const NO_CLUSTER_SUMMARY: &str = "No HA cluster discovered on this host";

pub struct ClusterProbe {
    source: Arc<dyn ClusterSource>,
    hostname: String,
}

impl ClusterProbe {
    pub fn new(source: Arc<dyn ClusterSource>, hostname: impl Into<String>) -> Self {
        Self {
            source,
            hostname: hostname.into(),
        }
    }
}

/// MD5 hex of the corosync authkey; identical on every node of a cluster
/// since they share the key.
pub fn cluster_id(authkey: &[u8]) -> String {
    format!("{:x}", Md5::digest(authkey))
}

#[async_trait]
impl DiscoveryProbe for ClusterProbe {
    fn discovery_type(&self) -> DiscoveryType {
        DiscoveryType::Cluster
    }

    async fn discover(&self) -> anyhow::Result<ProbeOutcome> {
        let cib = match self.source.cib().await {
            Ok(cib) => cib,
            Err(err) => {
                debug!(?err, "cib unavailable; assuming no cluster");
                return Ok(ProbeOutcome::absent(NO_CLUSTER_SUMMARY));
            }
        };
        let crmmon = match self.source.crm_mon().await {
            Ok(crmmon) => crmmon,
            Err(err) => {
                debug!(?err, "crm_mon unavailable; assuming no cluster");
                return Ok(ProbeOutcome::absent(NO_CLUSTER_SUMMARY));
            }
        };

        let authkey = self
            .source
            .corosync_authkey()
            .await
            .context("failed to derive cluster id")?;

        let name = cib.cluster_name();
        let mut snapshot = ClusterSnapshot {
            cib,
            crmmon,
            sbd: None,
            id: cluster_id(&authkey),
            name,
        };

        if snapshot.is_fencing_sbd() {
            snapshot.sbd = Some(
                self.source
                    .sbd()
                    .await
                    .context("failed to load SBD fencing state")?,
            );
        }

        debug!(
            cluster_id = %snapshot.id,
            fencing = %snapshot.fencing_type(),
            is_dc = snapshot.is_dc(&self.hostname),
            "cluster discovered"
        );

        Ok(ProbeOutcome::found(
            format!("Cluster with name: {} successfully discovered", snapshot.name),
            DiscoveryPayload::Cluster(Box::new(snapshot)),
        ))
    }
}
