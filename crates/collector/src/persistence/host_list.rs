use chrono::{DateTime, Utc};
use common::DiscoveryType;
use common::api::HostListEntry;
use common::host::HostDiscovery;
use sqlx::types::Json;
use sqlx::{FromRow, QueryBuilder, SqliteConnection};

use super::{Db, push_in};
use crate::Result;

/// Row written by one discovery event. Each variant owns one table keyed by
/// agent id and replaces that row whole; the host list joins them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostUpdate {
    Facts(HostDiscovery),
    Cluster(String),
    Cloud(Option<String>),
    SapSystems(Vec<String>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostFilters {
    /// Hosts running any of these SIDs.
    pub sids: Vec<String>,
    pub cluster_ids: Vec<String>,
}

#[derive(Debug, Clone, FromRow)]
struct HostListRecord {
    agent_id: String,
    hostname: String,
    os_version: String,
    ip_addresses: Json<Vec<String>>,
    cpu_count: i64,
    socket_count: i64,
    total_memory_mb: i64,
    agent_version: String,
    ssh_address: String,
    cluster_id: Option<String>,
    cloud_provider: Option<String>,
    sap_systems: Json<Vec<String>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<HostListRecord> for HostListEntry {
    type Error = anyhow::Error;

    fn try_from(record: HostListRecord) -> Result<Self> {
        Ok(HostListEntry {
            agent_id: record.agent_id,
            hostname: record.hostname,
            os_version: record.os_version,
            ip_addresses: record.ip_addresses.0,
            cpu_count: u32::try_from(record.cpu_count)?,
            socket_count: u32::try_from(record.socket_count)?,
            total_memory_mb: u64::try_from(record.total_memory_mb)?,
            agent_version: record.agent_version,
            ssh_address: record.ssh_address,
            cluster_id: record.cluster_id,
            cloud_provider: record.cloud_provider,
            sap_systems: record.sap_systems.0,
            updated_at: record.updated_at,
        })
    }
}

/// Every agent with at least one host row, joined with whatever the other
/// tables hold for it. Columns without a row yet read as empty.
const HOST_SELECT: &str = r#"
    WITH hosts AS (
        SELECT agent_id FROM host_facts
        UNION SELECT agent_id FROM host_cluster
        UNION SELECT agent_id FROM host_cloud
        UNION SELECT agent_id FROM host_sap_systems
    )
    SELECT
        hosts.agent_id AS agent_id,
        COALESCE(f.hostname, '') AS hostname,
        COALESCE(f.os_version, '') AS os_version,
        COALESCE(f.ip_addresses, '[]') AS ip_addresses,
        COALESCE(f.cpu_count, 0) AS cpu_count,
        COALESCE(f.socket_count, 0) AS socket_count,
        COALESCE(f.total_memory_mb, 0) AS total_memory_mb,
        COALESCE(f.agent_version, '') AS agent_version,
        COALESCE(f.ssh_address, '') AS ssh_address,
        c.cluster_id AS cluster_id,
        cl.cloud_provider AS cloud_provider,
        COALESCE(s.sap_systems, '[]') AS sap_systems,
        MAX(
            COALESCE(f.updated_at, ''),
            COALESCE(c.updated_at, ''),
            COALESCE(cl.updated_at, ''),
            COALESCE(s.updated_at, '')
        ) AS updated_at
    FROM hosts
    LEFT JOIN host_facts AS f ON f.agent_id = hosts.agent_id
    LEFT JOIN host_cluster AS c ON c.agent_id = hosts.agent_id
    LEFT JOIN host_cloud AS cl ON cl.agent_id = hosts.agent_id
    LEFT JOIN host_sap_systems AS s ON s.agent_id = hosts.agent_id
    WHERE 1 = 1"#;

/// Replaces the row `update` owns for `agent_id`. `event_id` is the event
/// being projected.
pub async fn upsert_host(
    conn: &mut SqliteConnection,
    agent_id: &str,
    event_id: i64,
    update: &HostUpdate,
    updated_at: DateTime<Utc>,
) -> Result<()> {
    match update {
        HostUpdate::Facts(host) => {
            sqlx::query(
                r#"
                INSERT INTO host_facts (
                    agent_id, hostname, os_version, ip_addresses, cpu_count, socket_count,
                    total_memory_mb, agent_version, ssh_address, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ON CONFLICT(agent_id) DO UPDATE SET
                    hostname = excluded.hostname,
                    os_version = excluded.os_version,
                    ip_addresses = excluded.ip_addresses,
                    cpu_count = excluded.cpu_count,
                    socket_count = excluded.socket_count,
                    total_memory_mb = excluded.total_memory_mb,
                    agent_version = excluded.agent_version,
                    ssh_address = excluded.ssh_address,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(agent_id)
            .bind(&host.hostname)
            .bind(&host.os_version)
            .bind(Json(&host.host_ip_addresses))
            .bind(i64::from(host.cpu_count))
            .bind(i64::from(host.socket_count))
            .bind(i64::try_from(host.total_memory_mb)?)
            .bind(&host.agent_version)
            .bind(&host.ssh_address)
            .bind(updated_at)
            .execute(&mut *conn)
            .await?;
        }
        HostUpdate::Cluster(cluster_id) => {
            sqlx::query(
                r#"
                INSERT INTO host_cluster (agent_id, cluster_id, event_id, updated_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(agent_id) DO UPDATE SET
                    cluster_id = excluded.cluster_id,
                    event_id = excluded.event_id,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(agent_id)
            .bind(cluster_id)
            .bind(event_id)
            .bind(updated_at)
            .execute(&mut *conn)
            .await?;
        }
        HostUpdate::Cloud(provider) => {
            sqlx::query(
                r#"
                INSERT INTO host_cloud (agent_id, cloud_provider, updated_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(agent_id) DO UPDATE SET
                    cloud_provider = excluded.cloud_provider,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(agent_id)
            .bind(provider)
            .bind(updated_at)
            .execute(&mut *conn)
            .await?;
        }
        HostUpdate::SapSystems(sids) => {
            sqlx::query(
                r#"
                INSERT INTO host_sap_systems (agent_id, sap_systems, updated_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(agent_id) DO UPDATE SET
                    sap_systems = excluded.sap_systems,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(agent_id)
            .bind(Json(sids))
            .bind(updated_at)
            .execute(&mut *conn)
            .await?;
        }
    }
    Ok(())
}

/// Drops the agent's cluster membership when no cluster event arrived
/// between its previous host event and `host_event_id`. Agents publish
/// nothing once a host leaves its cluster, so a full discovery tick without
/// a cluster event is the only signal. Returns whether a row was removed.
pub async fn clear_stale_cluster(
    conn: &mut SqliteConnection,
    agent_id: &str,
    host_event_id: i64,
) -> Result<bool> {
    let previous_host_event = sqlx::query_scalar::<_, Option<i64>>(
        r#"
        SELECT MAX(id) FROM discovery_events
        WHERE agent_id = ?1 AND discovery_type = ?2 AND id < ?3
        "#,
    )
    .bind(agent_id)
    .bind(DiscoveryType::Host.as_str())
    .bind(host_event_id)
    .fetch_one(&mut *conn)
    .await?;
    let Some(previous_host_event) = previous_host_event else {
        return Ok(false);
    };

    let removed = sqlx::query(
        r#"
        DELETE FROM host_cluster
        WHERE agent_id = ?1
          AND event_id < ?3
          AND NOT EXISTS (
              SELECT 1 FROM discovery_events
              WHERE agent_id = ?1 AND discovery_type = ?2 AND id > ?4 AND id < ?3
          )
        "#,
    )
    .bind(agent_id)
    .bind(DiscoveryType::Cluster.as_str())
    .bind(host_event_id)
    .bind(previous_host_event)
    .execute(&mut *conn)
    .await?;

    Ok(removed.rows_affected() > 0)
}

pub async fn get_host(db: &Db, agent_id: &str) -> Result<Option<HostListEntry>> {
    let record = sqlx::query_as::<_, HostListRecord>(&format!(
        "{HOST_SELECT} AND hosts.agent_id = ?1"
    ))
    .bind(agent_id)
    .fetch_optional(db)
    .await?;

    record.map(HostListEntry::try_from).transpose()
}

pub async fn list_hosts(db: &Db, filters: &HostFilters, limit: u32) -> Result<Vec<HostListEntry>> {
    let sids: Vec<&str> = filters.sids.iter().map(String::as_str).collect();
    let cluster_ids: Vec<&str> = filters.cluster_ids.iter().map(String::as_str).collect();

    let mut qb = QueryBuilder::<sqlx::Sqlite>::new(HOST_SELECT);
    push_in(&mut qb, "c.cluster_id", &cluster_ids);
    if !sids.is_empty() {
        qb.push(" AND EXISTS (SELECT 1 FROM json_each(s.sap_systems) AS sid WHERE 1 = 1");
        push_in(&mut qb, "sid.value", &sids);
        qb.push(")");
    }
    qb.push(" ORDER BY COALESCE(f.hostname, '') ASC, hosts.agent_id ASC LIMIT ");
    qb.push_bind(i64::from(limit));

    let records = qb
        .build_query_as::<HostListRecord>()
        .fetch_all(db)
        .await?;

    records.into_iter().map(HostListEntry::try_from).collect()
}
