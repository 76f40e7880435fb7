use chrono::{DateTime, Utc};
use common::DiscoveryType;
use common::api::AgentSeenEntry;
use sqlx::{FromRow, SqliteConnection};

use super::Db;
use crate::Result;

#[derive(Debug, Clone, FromRow)]
struct AgentSeenRecord {
    agent_id: String,
    discovery_type: String,
    event_id: i64,
    seen_at: DateTime<Utc>,
}

impl From<AgentSeenRecord> for AgentSeenEntry {
    fn from(record: AgentSeenRecord) -> Self {
        AgentSeenEntry {
            agent_id: record.agent_id,
            discovery_type: record.discovery_type,
            event_id: record.event_id,
            seen_at: record.seen_at,
        }
    }
}

/// Records `event_id` as the latest projected event for the agent and type.
///
/// Returns `false` when a newer event is already recorded; the row is left
/// untouched in that case.
pub async fn upsert_agent_seen(
    conn: &mut SqliteConnection,
    agent_id: &str,
    discovery_type: DiscoveryType,
    event_id: i64,
    seen_at: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO agent_seen (agent_id, discovery_type, event_id, seen_at)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(agent_id, discovery_type) DO UPDATE SET
            event_id = excluded.event_id,
            seen_at = excluded.seen_at
        WHERE excluded.event_id >= agent_seen.event_id
        "#,
    )
    .bind(agent_id)
    .bind(discovery_type.as_str())
    .bind(event_id)
    .bind(seen_at)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn list_agent_seen(db: &Db, agent_id: &str) -> Result<Vec<AgentSeenEntry>> {
    let records = sqlx::query_as::<_, AgentSeenRecord>(
        r#"
        SELECT agent_id, discovery_type, event_id, seen_at
        FROM agent_seen
        WHERE agent_id = ?1
        ORDER BY discovery_type ASC
        "#,
    )
    .bind(agent_id)
    .fetch_all(db)
    .await?;

    Ok(records.into_iter().map(AgentSeenEntry::from).collect())
}
