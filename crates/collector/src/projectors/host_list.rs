use async_trait::async_trait;
use chrono::Utc;
use common::DiscoveryPayload;
use common::cloud::CloudProvider;
use sqlx::SqliteConnection;
use tracing::debug;

use super::Projector;
use crate::Result;
use crate::persistence::{DiscoveryEvent, HostUpdate, host_list};

/// Maintains the per-agent host tables. Every discovery type owns one table
/// and replaces its row whole; a host event also drops a cluster membership
/// that was not reported during the last tick.
pub struct HostListProjector;

#[async_trait]
impl Projector for HostListProjector {
    fn name(&self) -> &'static str {
        "host_list"
    }

    async fn project(&self, conn: &mut SqliteConnection, event: &DiscoveryEvent) -> Result<()> {
        let Some(update) = host_update(&event.payload) else {
            anyhow::bail!(
                "host_list projector cannot handle {} events",
                event.discovery_type
            );
        };
        host_list::upsert_host(conn, &event.agent_id, event.id, &update, Utc::now()).await?;

        if matches!(update, HostUpdate::Facts(_))
            && host_list::clear_stale_cluster(conn, &event.agent_id, event.id).await?
        {
            debug!(agent_id = %event.agent_id, "host left its cluster");
        }
        Ok(())
    }
}

pub fn host_update(payload: &DiscoveryPayload) -> Option<HostUpdate> {
    match payload {
        DiscoveryPayload::Host(host) => Some(HostUpdate::Facts(host.clone())),
        DiscoveryPayload::Cluster(snapshot) => Some(HostUpdate::Cluster(snapshot.id.clone())),
        DiscoveryPayload::Cloud(instance) => Some(HostUpdate::Cloud(
            (instance.provider != CloudProvider::Unknown)
                .then(|| instance.provider.as_str().to_string()),
        )),
        DiscoveryPayload::SapSystems(systems) => Some(HostUpdate::SapSystems(
            systems.iter().map(|system| system.sid.clone()).collect(),
        )),
        DiscoveryPayload::Subscriptions(_) => None,
    }
}
