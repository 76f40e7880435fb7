use common::api::CollectRequest;
use common::{DiscoveryPayload, DiscoveryType, PayloadError};
use tracing::debug;

use crate::persistence::{Db, DiscoveryEvent, events};
use crate::projectors::ProjectorQueue;
use crate::telemetry;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unknown discovery type: {0}")]
    UnknownDiscoveryType(String),
    #[error("invalid {discovery_type} payload: {reason}")]
    InvalidPayload {
        discovery_type: DiscoveryType,
        reason: String,
    },
    #[error("agent_id cannot be empty")]
    EmptyAgentId,
    #[error("event {event_id} was stored but could not be queued for projection")]
    QueueClosed { event_id: i64 },
    #[error(transparent)]
    Persistence(#[from] anyhow::Error),
}

impl StoreError {
    /// Short reason logged by ingress. For events that were never stored it
    /// is also the `collector_events_rejected_total` label.
    pub fn reason(&self) -> &'static str {
        match self {
            StoreError::UnknownDiscoveryType(_) => "unknown_discovery_type",
            StoreError::InvalidPayload { .. } => "invalid_payload",
            StoreError::EmptyAgentId => "empty_agent_id",
            StoreError::QueueClosed { .. } => "queue_closed",
            StoreError::Persistence(_) => "persistence",
        }
    }
}

impl From<PayloadError> for StoreError {
    fn from(err: PayloadError) -> Self {
        match err {
            PayloadError::UnknownType(tag) => StoreError::UnknownDiscoveryType(tag),
            PayloadError::Invalid {
                discovery_type,
                reason,
            } => StoreError::InvalidPayload {
                discovery_type,
                reason,
            },
        }
    }
}

/// Validates, persists and hands discovery events to the projectors.
#[derive(Clone)]
pub struct CollectorService {
    db: Db,
    queue: ProjectorQueue,
}

impl CollectorService {
    pub fn new(db: Db, queue: ProjectorQueue) -> Self {
        Self { db, queue }
    }

    pub fn queue(&self) -> &ProjectorQueue {
        &self.queue
    }

    /// Nothing is written unless the tag and payload are valid. Once stored,
    /// the event is queued, waiting for room when the queue is full.
    pub async fn store_event(&self, request: CollectRequest) -> Result<DiscoveryEvent, StoreError> {
        let result = self.validate_and_store(request).await;
        match &result {
            // Stored and counted by `collector_events_unqueued_total`.
            Err(StoreError::QueueClosed { .. }) | Ok(_) => {}
            Err(err) => telemetry::record_event_rejected(err.reason()),
        }
        result
    }

    async fn validate_and_store(&self, request: CollectRequest) -> Result<DiscoveryEvent, StoreError> {
        let discovery_type: DiscoveryType = request.discovery_type.parse()?;
        let payload = DiscoveryPayload::decode(discovery_type, request.payload)?;
        let agent_id = request.agent_id.trim();
        if agent_id.is_empty() {
            return Err(StoreError::EmptyAgentId);
        }

        let event = events::insert_event(&self.db, agent_id, payload).await?;
        telemetry::record_event_stored(discovery_type);
        debug!(
            event_id = event.id,
            agent_id,
            %discovery_type,
            "discovery event stored"
        );

        let event_id = event.id;
        if self.queue.enqueue(event.clone()).await.is_err() {
            telemetry::record_event_unqueued(discovery_type);
            return Err(StoreError::QueueClosed { event_id });
        }
        Ok(event)
    }
}
