use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::api::{ClusterListEntry, ClusterType};
use sqlx::{FromRow, QueryBuilder, SqliteConnection};

use super::{Db, push_in};
use crate::Result;

/// Cluster read-model row as produced by the projector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterListRow {
    pub id: String,
    pub name: String,
    pub cluster_type: ClusterType,
    pub sid: String,
    pub resources_number: u32,
    pub hosts_number: u32,
}

/// Filters for [`list_clusters`]. Values inside one field are OR-ed, fields are AND-ed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterFilters {
    pub names: Vec<String>,
    pub sids: Vec<String>,
    pub cluster_types: Vec<ClusterType>,
}

#[derive(Debug, Clone, FromRow)]
struct ClusterListRecord {
    id: String,
    name: String,
    cluster_type: String,
    sid: String,
    resources_number: i64,
    hosts_number: i64,
    updated_at: DateTime<Utc>,
}

impl ClusterListRecord {
    fn into_entry(self, has_duplicated_name: bool) -> Result<ClusterListEntry> {
        let cluster_type = self
            .cluster_type
            .parse::<ClusterType>()
            .map_err(anyhow::Error::msg)?;
        Ok(ClusterListEntry {
            id: self.id,
            name: self.name,
            cluster_type,
            sid: self.sid,
            resources_number: u32::try_from(self.resources_number)?,
            hosts_number: u32::try_from(self.hosts_number)?,
            has_duplicated_name,
            updated_at: self.updated_at,
        })
    }
}

/// Inserts the row or replaces every column of the existing one.
pub async fn upsert_cluster(
    conn: &mut SqliteConnection,
    row: &ClusterListRow,
    updated_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO cluster_list (
            id, name, cluster_type, sid, resources_number, hosts_number, updated_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            cluster_type = excluded.cluster_type,
            sid = excluded.sid,
            resources_number = excluded.resources_number,
            hosts_number = excluded.hosts_number,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&row.id)
    .bind(&row.name)
    .bind(row.cluster_type.as_str())
    .bind(&row.sid)
    .bind(i64::from(row.resources_number))
    .bind(i64::from(row.hosts_number))
    .bind(updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn get_cluster(db: &Db, id: &str) -> Result<Option<ClusterListEntry>> {
    let record = sqlx::query_as::<_, ClusterListRecord>(
        r#"
        SELECT id, name, cluster_type, sid, resources_number, hosts_number, updated_at
        FROM cluster_list
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await?;

    let Some(record) = record else {
        return Ok(None);
    };

    let namesakes: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM cluster_list WHERE name = ?1 AND id != ?2",
    )
    .bind(&record.name)
    .bind(&record.id)
    .fetch_one(db)
    .await?;

    record.into_entry(namesakes > 0).map(Some)
}

/// Lists clusters ordered by name. `has_duplicated_name` is computed over the
/// returned rows only.
pub async fn list_clusters(
    db: &Db,
    filters: &ClusterFilters,
    limit: u32,
) -> Result<Vec<ClusterListEntry>> {
    let names: Vec<&str> = filters.names.iter().map(String::as_str).collect();
    let sids: Vec<&str> = filters.sids.iter().map(String::as_str).collect();
    let cluster_types: Vec<&str> = filters.cluster_types.iter().map(|t| t.as_str()).collect();

    let mut qb = QueryBuilder::<sqlx::Sqlite>::new(
        "SELECT id, name, cluster_type, sid, resources_number, hosts_number, updated_at \
         FROM cluster_list WHERE 1 = 1",
    );
    push_in(&mut qb, "name", &names);
    push_in(&mut qb, "sid", &sids);
    push_in(&mut qb, "cluster_type", &cluster_types);

    qb.push(" ORDER BY name ASC, id ASC LIMIT ");
    qb.push_bind(i64::from(limit));

    let records = qb
        .build_query_as::<ClusterListRecord>()
        .fetch_all(db)
        .await?;

    let mut name_counts: HashMap<String, usize> = HashMap::new();
    for record in &records {
        *name_counts.entry(record.name.clone()).or_default() += 1;
    }

    records
        .into_iter()
        .map(|record| {
            let duplicated = name_counts.get(&record.name).copied().unwrap_or(0) > 1;
            record.into_entry(duplicated)
        })
        .collect()
}
