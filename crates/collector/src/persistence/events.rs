use anyhow::Context;
use chrono::{DateTime, Utc};
use common::{DiscoveryPayload, DiscoveryType};
use serde_json::Value;
use sqlx::FromRow;
use sqlx::types::Json;

use super::Db;
use crate::Result;

/// A stored discovery event with its decoded payload.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryEvent {
    pub id: i64,
    pub agent_id: String,
    pub discovery_type: DiscoveryType,
    pub payload: DiscoveryPayload,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
struct EventRecord {
    id: i64,
    agent_id: String,
    discovery_type: String,
    payload: Json<Value>,
    created_at: DateTime<Utc>,
}

impl TryFrom<EventRecord> for DiscoveryEvent {
    type Error = anyhow::Error;

    fn try_from(record: EventRecord) -> Result<Self> {
        let discovery_type: DiscoveryType = record
            .discovery_type
            .parse()
            .with_context(|| format!("event {} has unknown discovery type", record.id))?;
        let payload = DiscoveryPayload::decode(discovery_type, record.payload.0)
            .with_context(|| format!("event {} payload no longer decodes", record.id))?;
        Ok(DiscoveryEvent {
            id: record.id,
            agent_id: record.agent_id,
            discovery_type,
            payload,
            created_at: record.created_at,
        })
    }
}

/// Persists a validated payload, assigning the event id and creation time.
pub async fn insert_event(
    db: &Db,
    agent_id: &str,
    payload: DiscoveryPayload,
) -> Result<DiscoveryEvent> {
    let discovery_type = payload.discovery_type();
    let created_at = Utc::now();
    let body = payload
        .to_value()
        .context("serialize discovery payload")?;

    let id = sqlx::query(
        r#"
        INSERT INTO discovery_events (agent_id, discovery_type, payload, created_at)
        VALUES (?1, ?2, ?3, ?4)
        "#,
    )
    .bind(agent_id)
    .bind(discovery_type.as_str())
    .bind(Json(body))
    .bind(created_at)
    .execute(db)
    .await?
    .last_insert_rowid();

    Ok(DiscoveryEvent {
        id,
        agent_id: agent_id.to_string(),
        discovery_type,
        payload,
        created_at,
    })
}

pub async fn get_event(db: &Db, id: i64) -> Result<Option<DiscoveryEvent>> {
    let record = sqlx::query_as::<_, EventRecord>(
        r#"
        SELECT id, agent_id, discovery_type, payload, created_at
        FROM discovery_events
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await?;

    record.map(DiscoveryEvent::try_from).transpose()
}

pub async fn count_events(db: &Db, agent_id: &str, discovery_type: DiscoveryType) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM discovery_events
        WHERE agent_id = ?1 AND discovery_type = ?2
        "#,
    )
    .bind(agent_id)
    .bind(discovery_type.as_str())
    .fetch_one(db)
    .await?;
    Ok(count)
}

/// Events newer than the last one projected for their agent and type,
/// oldest first. Used to replay work left behind by a previous run.
pub async fn unprojected_events(db: &Db, limit: u32) -> Result<Vec<DiscoveryEvent>> {
    let records = sqlx::query_as::<_, EventRecord>(
        r#"
        SELECT e.id, e.agent_id, e.discovery_type, e.payload, e.created_at
        FROM discovery_events e
        LEFT JOIN agent_seen s
            ON s.agent_id = e.agent_id AND s.discovery_type = e.discovery_type
        WHERE s.event_id IS NULL OR e.id > s.event_id
        ORDER BY e.id ASC
        LIMIT ?1
        "#,
    )
    .bind(i64::from(limit))
    .fetch_all(db)
    .await?;

    records.into_iter().map(DiscoveryEvent::try_from).collect()
}
