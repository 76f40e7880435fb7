use common::DiscoveryPayload;
use common::cluster::{
    Attribute, Cib, CibClone, ClusterSnapshot, CrmMon, CrmMonClone, CrmMonResource, Primitive,
};

use crate::persistence::{Db, DiscoveryEvent, events, migrations};

pub(crate) async fn setup_db() -> Db {
    let db = migrations::init_pool("sqlite::memory:")
        .await
        .expect("pool");
    migrations::run_migrations(&db).await.expect("migrations");
    db
}

pub(crate) async fn store_payload(
    db: &Db,
    agent_id: &str,
    payload: DiscoveryPayload,
) -> DiscoveryEvent {
    events::insert_event(db, agent_id, payload)
        .await
        .expect("insert event")
}

/// Snapshot whose crm_mon clone set runs `agents`. With a `sid`, the CIB
/// carries a cloned SAPHanaTopology primitive holding that SID.
pub(crate) fn cluster_snapshot(
    id: &str,
    name: &str,
    agents: &[&str],
    sid: Option<&str>,
) -> ClusterSnapshot {
    let mut cib = Cib::default();
    if let Some(sid) = sid {
        cib.configuration.resources.clones.push(CibClone {
            id: "cln_SAPHanaTopology".to_string(),
            primitive: Primitive {
                id: "rsc_SAPHanaTopology".to_string(),
                class: "ocf".to_string(),
                provider: "suse".to_string(),
                kind: "SAPHanaTopology".to_string(),
                instance_attributes: vec![Attribute {
                    id: "rsc_SAPHanaTopology-instance_attributes-SID".to_string(),
                    name: "SID".to_string(),
                    value: sid.to_string(),
                }],
            },
            ..CibClone::default()
        });
    }

    let mut crmmon = CrmMon::default();
    crmmon.clones.push(CrmMonClone {
        id: "cln_hana".to_string(),
        resources: agents
            .iter()
            .enumerate()
            .map(|(idx, agent)| CrmMonResource {
                id: format!("rsc_{idx}"),
                agent: agent.to_string(),
                active: true,
                ..CrmMonResource::default()
            })
            .collect(),
        ..CrmMonClone::default()
    });
    crmmon.summary.nodes.number = 2;
    crmmon.summary.resources.number = u32::try_from(agents.len()).unwrap_or(u32::MAX);

    ClusterSnapshot {
        cib,
        crmmon,
        sbd: None,
        id: id.to_string(),
        name: name.to_string(),
    }
}
