use std::{net::SocketAddr, sync::Arc, time::Duration};

use tokio::{sync::watch, task::JoinHandle};
use tracing::{error, info, warn};

use crate::{
    collector_client::{CollectorClient, DisabledPublisher, DynPublisher},
    config,
    identity::AgentIdentity,
    liveness::LivenessState,
    probes,
    scheduler::DiscoveryScheduler,
    telemetry, version,
};

/// Lifecycle of a started agent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AgentState {
    Created,
    Running,
    Stopping,
    Stopped,
}

/// Controls optional behaviours when starting the agent programmatically.
#[derive(Clone, Debug)]
pub struct AgentOptions {
    /// Initialize a tracing subscriber before starting the agent.
    pub init_tracing: bool,
    /// Start the dedicated `/metrics` and `/health` HTTP server.
    pub serve_metrics: bool,
    /// Reuse an existing Prometheus recorder instead of installing a new one.
    pub metrics_handle: Option<metrics_exporter_prometheus::PrometheusHandle>,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            init_tracing: true,
            serve_metrics: true,
            metrics_handle: None,
        }
    }
}

/// Handle returned by [`start_agent`] to manage shutdown when embedded.
pub struct AgentHandle {
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    state_tx: Arc<watch::Sender<AgentState>>,
    liveness: LivenessState,
    tasks: Vec<JoinHandle<()>>,
}

impl AgentHandle {
    /// Returns a cloneable receiver that fires when shutdown is requested.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Receiver tracking the agent lifecycle.
    pub fn state(&self) -> watch::Receiver<AgentState> {
        self.state_tx.subscribe()
    }

    pub fn liveness(&self) -> LivenessState {
        self.liveness.clone()
    }

    /// Request a graceful shutdown; idempotent. An in-flight tick finishes first.
    pub fn request_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        self.state_tx.send_if_modified(|state| match state {
            AgentState::Created | AgentState::Running => {
                *state = AgentState::Stopping;
                true
            }
            AgentState::Stopping | AgentState::Stopped => false,
        });
    }

    /// Wait for all agent tasks to finish.
    pub async fn await_termination(self) -> anyhow::Result<()> {
        for handle in self.tasks {
            if let Err(join_err) = handle.await {
                if join_err.is_panic() {
                    error!(?join_err, "agent task panicked during shutdown");
                    self.state_tx.send_replace(AgentState::Stopped);
                    anyhow::bail!("agent task panicked");
                }
            }
        }

        self.state_tx.send_replace(AgentState::Stopped);
        Ok(())
    }

    /// Request shutdown and block until all tasks have stopped.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        self.request_shutdown();
        self.await_termination().await
    }
}

/// Start the discovery agent using the provided configuration and options.
///
/// Identity and collector client construction happen here, so missing
/// machine-id or mTLS material fails before any discovery runs.
pub async fn start_agent(
    cfg: config::AppConfig,
    mut options: AgentOptions,
) -> anyhow::Result<AgentHandle> {
    if options.init_tracing {
        telemetry::init_tracing();
    }

    let metrics_handle = match options.metrics_handle.take() {
        Some(handle) => telemetry::register_metrics_handle(handle),
        None => telemetry::init_metrics_recorder(),
    };
    let metrics_addr: SocketAddr = format!("{}:{}", cfg.metrics_host, cfg.metrics_port)
        .parse()
        .map_err(|err| anyhow::anyhow!("invalid metrics bind address: {}", err))?;

    let identity = AgentIdentity::load(&cfg)?;
    let publisher: DynPublisher = if cfg.collector.enabled {
        Arc::new(CollectorClient::new(&cfg.collector, &identity)?)
    } else {
        warn!("collector publishing disabled; discoveries only feed liveness");
        Arc::new(DisabledPublisher)
    };
    let scheduler = DiscoveryScheduler::new(probes::default_probes(&cfg, &identity)?, publisher);

    let interval = cfg.discovery_interval();
    let liveness = LivenessState::register(interval * 2);

    info!(
        agent_id = %identity.agent_id,
        hostname = %identity.hostname,
        collector = %cfg.collector.host,
        collector_enabled = cfg.collector.enabled,
        mtls = cfg.collector.mtls_enabled,
        interval_secs = cfg.discovery_interval_secs,
        version = version::VERSION,
        git_sha = version::GIT_SHA,
        dirty = version::GIT_DIRTY,
        built_at = version::BUILD_TIMESTAMP,
        "discovery agent starting"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (state_tx, _) = watch::channel(AgentState::Created);
    let state_tx = Arc::new(state_tx);
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    if options.serve_metrics {
        let metrics_handle = metrics_handle.clone();
        let liveness = liveness.clone();
        let mut shutdown = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            let shutdown_fut = async move {
                if *shutdown.borrow() {
                    return;
                }
                let _ = shutdown.changed().await;
            };
            if let Err(err) = telemetry::serve_metrics_with_shutdown(
                metrics_handle,
                liveness,
                metrics_addr,
                shutdown_fut,
            )
            .await
            {
                error!(?err, "metrics server exited with error");
            }
        }));
    }

    {
        let liveness = liveness.clone();
        let shutdown = shutdown_rx.clone();
        let state_tx = state_tx.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(err) =
                run_discovery_loop(scheduler, liveness, interval, shutdown, state_tx).await
            {
                error!(?err, "discovery loop terminated with error");
            }
        }));
    }

    Ok(AgentHandle {
        shutdown_tx,
        shutdown_rx,
        state_tx,
        liveness,
        tasks,
    })
}

/// Runs a tick immediately, then one tick per `interval` measured from the
/// end of the previous tick, until `shutdown` flips to true.
///
/// Shutdown is only observed between ticks.
pub async fn run_discovery_loop(
    scheduler: DiscoveryScheduler,
    liveness: LivenessState,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
    state: Arc<watch::Sender<AgentState>>,
) -> anyhow::Result<()> {
    state.send_if_modified(|current| {
        if *current == AgentState::Created {
            *current = AgentState::Running;
            true
        } else {
            false
        }
    });

    loop {
        if *shutdown.borrow() {
            break;
        }

        let report = scheduler.run_tick().await;
        liveness.update(report.status, report.output()).await;

        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }

    state.send_replace(AgentState::Stopped);
    info!("discovery loop stopped");
    Ok(())
}

/// Waits for Ctrl+C or SIGTERM.
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => stream.recv().await,
            Err(err) => {
                error!(%err, "failed to install SIGTERM handler");
                None
            }
        };
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
