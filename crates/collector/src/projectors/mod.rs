//! Read-model projection.
//!
//! Stored events are handed to a bounded queue drained by a fixed pool of
//! workers. Each event is projected inside one transaction: the agent's
//! `agent_seen` row is advanced and every projector registered for the
//! event's discovery type writes its read model. Projectors replace whole
//! rows keyed by a natural id, so delivering an event twice leaves the read
//! models unchanged.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use common::DiscoveryType;
use sqlx::SqliteConnection;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::Result;
use crate::config::ProjectorConfig;
use crate::persistence::{Db, DiscoveryEvent, agent_seen, events};
use crate::telemetry;

pub mod cluster_list;
pub mod host_list;

pub use cluster_list::ClusterListProjector;
pub use host_list::HostListProjector;

/// Upper bound of events re-queued at startup.
const REPLAY_BATCH: u32 = 1_000;

#[async_trait]
pub trait Projector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Writes the read model for `event` on the caller's transaction.
    async fn project(&self, conn: &mut SqliteConnection, event: &DiscoveryEvent) -> Result<()>;
}

pub type DynProjector = Arc<dyn Projector>;

/// Projectors by discovery type. A type registered without projectors is
/// still bookkept in `agent_seen`; an absent type is dropped.
#[derive(Clone, Default)]
pub struct ProjectorRegistry {
    handlers: HashMap<DiscoveryType, Vec<DynProjector>>,
}

impl ProjectorRegistry {
    pub fn with_read_models() -> Self {
        let cluster_list: DynProjector = Arc::new(ClusterListProjector);
        let host_list: DynProjector = Arc::new(HostListProjector);

        Self::default()
            .register(DiscoveryType::Cluster, cluster_list)
            .register(DiscoveryType::Cluster, host_list.clone())
            .register(DiscoveryType::Host, host_list.clone())
            .register(DiscoveryType::Cloud, host_list.clone())
            .register(DiscoveryType::SapSystems, host_list)
            .track(DiscoveryType::Subscription)
    }

    pub fn register(mut self, discovery_type: DiscoveryType, projector: DynProjector) -> Self {
        self.handlers
            .entry(discovery_type)
            .or_default()
            .push(projector);
        self
    }

    pub fn track(mut self, discovery_type: DiscoveryType) -> Self {
        self.handlers.entry(discovery_type).or_default();
        self
    }

    pub fn handlers(&self, discovery_type: DiscoveryType) -> Option<&[DynProjector]> {
        self.handlers.get(&discovery_type).map(Vec::as_slice)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionOutcome {
    Projected,
    /// A newer event of the same agent and type was already projected.
    Stale,
    Unhandled,
}

pub async fn project(
    db: &Db,
    registry: &ProjectorRegistry,
    event: &DiscoveryEvent,
) -> Result<ProjectionOutcome> {
    let discovery_type = event.discovery_type;
    let Some(handlers) = registry.handlers(discovery_type) else {
        error!(
            event_id = event.id,
            agent_id = %event.agent_id,
            %discovery_type,
            "no projector registered for discovery type, dropping event"
        );
        telemetry::record_projection(discovery_type, "unhandled");
        return Ok(ProjectionOutcome::Unhandled);
    };

    let mut tx = db.begin().await?;
    let fresh = agent_seen::upsert_agent_seen(
        &mut tx,
        &event.agent_id,
        discovery_type,
        event.id,
        Utc::now(),
    )
    .await?;
    if !fresh {
        tx.rollback().await?;
        debug!(event_id = event.id, %discovery_type, "skipping superseded event");
        telemetry::record_projection(discovery_type, "stale");
        return Ok(ProjectionOutcome::Stale);
    }

    for handler in handlers {
        handler
            .project(&mut tx, event)
            .await
            .with_context(|| format!("{} projector failed on event {}", handler.name(), event.id))?;
    }
    tx.commit().await?;

    telemetry::record_projection(discovery_type, "success");
    Ok(ProjectionOutcome::Projected)
}

#[derive(Debug, thiserror::Error)]
#[error("projector queue is closed")]
pub struct QueueClosed;

/// Producer side of the projection queue. `enqueue` waits while the queue is full.
#[derive(Clone)]
pub struct ProjectorQueue {
    tx: mpsc::Sender<DiscoveryEvent>,
}

impl ProjectorQueue {
    pub(crate) fn bounded(capacity: usize) -> (Self, mpsc::Receiver<DiscoveryEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    pub async fn enqueue(&self, event: DiscoveryEvent) -> std::result::Result<(), QueueClosed> {
        self.tx.send(event).await.map_err(|_| QueueClosed)?;
        telemetry::record_queue_depth(self.depth());
        Ok(())
    }

    pub fn depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

pub struct ProjectorPool {
    workers: Vec<JoinHandle<()>>,
}

impl ProjectorPool {
    /// Waits for every worker. Workers stop once shutdown is requested or the
    /// queue is closed; events left in the queue are replayed on next start.
    pub async fn join(self) -> Result<()> {
        for handle in self.workers {
            if let Err(err) = handle.await
                && err.is_panic()
            {
                anyhow::bail!("projector worker panicked");
            }
        }
        Ok(())
    }
}

pub fn start_projectors(
    db: Db,
    registry: ProjectorRegistry,
    cfg: &ProjectorConfig,
    shutdown: watch::Receiver<bool>,
) -> (ProjectorQueue, ProjectorPool) {
    let (queue, rx) = ProjectorQueue::bounded(cfg.queue_capacity);
    let rx = Arc::new(Mutex::new(rx));
    let registry = Arc::new(registry);

    let workers = (0..cfg.workers)
        .map(|worker| {
            tokio::spawn(worker_loop(
                worker,
                db.clone(),
                registry.clone(),
                rx.clone(),
                shutdown.clone(),
            ))
        })
        .collect();

    info!(
        workers = cfg.workers,
        queue_capacity = cfg.queue_capacity,
        "projector pool started"
    );
    (queue, ProjectorPool { workers })
}

/// Re-queues stored events that were never projected, oldest first.
pub async fn replay_unprojected(db: &Db, queue: &ProjectorQueue) -> Result<usize> {
    let pending = events::unprojected_events(db, REPLAY_BATCH).await?;
    let count = pending.len();
    for event in pending {
        queue.enqueue(event).await?;
    }
    if count > 0 {
        info!(count, "replaying unprojected events");
    }
    Ok(count)
}

async fn worker_loop(
    worker: usize,
    db: Db,
    registry: Arc<ProjectorRegistry>,
    rx: Arc<Mutex<mpsc::Receiver<DiscoveryEvent>>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let next = tokio::select! {
            event = async { rx.lock().await.recv().await } => event,
            _ = async {
                let _ = shutdown.wait_for(|stop| *stop).await;
            } => None,
        };
        let Some(event) = next else {
            debug!(worker, "projector worker stopping");
            break;
        };

        if let Err(err) = project(&db, &registry, &event).await {
            warn!(
                worker,
                event_id = event.id,
                agent_id = %event.agent_id,
                discovery_type = %event.discovery_type,
                error = %format!("{err:#}"),
                "projection rolled back"
            );
            telemetry::record_projection(event.discovery_type, "error");
        }
    }
}
