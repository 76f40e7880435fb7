use async_trait::async_trait;
use chrono::Utc;
use common::DiscoveryPayload;
use common::api::ClusterType;
use common::cluster::{Cib, ClusterSnapshot, CrmMon};
use sqlx::SqliteConnection;

use super::Projector;
use crate::Result;
use crate::persistence::{ClusterListRow, DiscoveryEvent, cluster_list};

pub const SAPHANA_TOPOLOGY_AGENT: &str = "ocf::suse:SAPHanaTopology";
pub const SAPHANA_AGENT: &str = "ocf::suse:SAPHana";
pub const SAPHANA_CONTROLLER_AGENT: &str = "ocf::suse:SAPHanaController";

const SAPHANA_TOPOLOGY_TYPE: &str = "SAPHanaTopology";
const SID_ATTRIBUTE: &str = "SID";

/// Keeps one `cluster_list` row per cluster id.
pub struct ClusterListProjector;

#[async_trait]
impl Projector for ClusterListProjector {
    fn name(&self) -> &'static str {
        "cluster_list"
    }

    async fn project(&self, conn: &mut SqliteConnection, event: &DiscoveryEvent) -> Result<()> {
        let DiscoveryPayload::Cluster(snapshot) = &event.payload else {
            anyhow::bail!(
                "cluster_list projector cannot handle {} events",
                event.discovery_type
            );
        };
        let row = transform_cluster_list(snapshot);
        cluster_list::upsert_cluster(conn, &row, Utc::now()).await
    }
}

pub fn transform_cluster_list(snapshot: &ClusterSnapshot) -> ClusterListRow {
    ClusterListRow {
        id: snapshot.id.clone(),
        name: snapshot.name.clone(),
        cluster_type: detect_cluster_type(&snapshot.crmmon),
        sid: hana_sid(&snapshot.cib),
        resources_number: snapshot.crmmon.summary.resources.number,
        hosts_number: snapshot.crmmon.summary.nodes.number,
    }
}

/// Classifies the cluster from the agents running inside its clone sets.
pub fn detect_cluster_type(crmmon: &CrmMon) -> ClusterType {
    let agents = || {
        crmmon
            .clones
            .iter()
            .flat_map(|clone| clone.resources.iter())
            .map(|resource| resource.agent.as_str())
    };
    let has_topology = agents().any(|agent| agent == SAPHANA_TOPOLOGY_AGENT);
    let has_hana = agents().any(|agent| agent == SAPHANA_AGENT);
    let has_controller = agents().any(|agent| agent == SAPHANA_CONTROLLER_AGENT);

    match (has_topology, has_hana, has_controller) {
        (true, true, _) => ClusterType::HanaScaleUp,
        (true, false, true) => ClusterType::HanaScaleOut,
        _ => ClusterType::Unknown,
    }
}

/// SID of the first cloned `SAPHanaTopology` primitive carrying one, else empty.
pub fn hana_sid(cib: &Cib) -> String {
    cib.configuration
        .resources
        .clones
        .iter()
        .filter(|clone| clone.primitive.kind == SAPHANA_TOPOLOGY_TYPE)
        .find_map(|clone| clone.primitive.instance_attribute(SID_ATTRIBUTE))
        .unwrap_or_default()
        .to_string()
}
