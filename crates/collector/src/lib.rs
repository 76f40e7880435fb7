pub mod app_state;
pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod persistence;
pub mod projectors;
pub mod services;
pub mod telemetry;
pub mod tls;
pub mod version;

pub type Result<T> = std::result::Result<T, anyhow::Error>;

use std::{future::Future, net::SocketAddr, time::Duration};

use tokio::{sync::watch, task::JoinHandle};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::app_state::AppState;
use crate::metrics::{init_metrics_recorder, record_build_info};
use crate::projectors::ProjectorRegistry;
use crate::services::CollectorService;

pub async fn run() -> Result<()> {
    run_with_shutdown(shutdown_signal()).await
}

pub async fn run_with_shutdown<S>(shutdown: S) -> Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let app_config = config::load()?;
    let metrics_handle = init_metrics_recorder();

    let db_pool = persistence::migrations::init_pool(&app_config.database.url).await?;
    let migration_outcome = persistence::migrations::run_migrations(&db_pool).await?;
    if migration_outcome.applied.is_empty() {
        info!(
            schema_version = migration_outcome.snapshot.latest_applied,
            "database schema is up to date"
        );
    } else {
        for migration in &migration_outcome.applied {
            info!(
                version = migration.version,
                description = %migration.description,
                "applied migration"
            );
        }
    }
    record_build_info(&migration_outcome.snapshot);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (queue, projector_pool) = projectors::start_projectors(
        db_pool.clone(),
        ProjectorRegistry::with_read_models(),
        &app_config.projectors,
        shutdown_rx.clone(),
    );
    projectors::replay_unprojected(&db_pool, &queue).await?;

    let state = AppState {
        db: db_pool.clone(),
        collector: CollectorService::new(db_pool.clone(), queue),
        limits: app_config.limits.clone(),
        metrics_handle,
    };

    let api_addr: SocketAddr = format!("{}:{}", app_config.server.host, app_config.server.port)
        .parse()
        .map_err(|err| anyhow::anyhow!("invalid server listen address: {}", err))?;
    let metrics_addr: SocketAddr =
        format!("{}:{}", app_config.metrics.host, app_config.metrics.port)
            .parse()
            .map_err(|err| anyhow::anyhow!("invalid metrics listen address: {}", err))?;

    let app = http::build_router(state.clone()).with_state(state.clone());
    let metrics_app = http::build_metrics_router().with_state(state.clone());

    let api_listener = tokio::net::TcpListener::bind(api_addr).await?;
    let metrics_listener = tokio::net::TcpListener::bind(metrics_addr).await?;
    info!(%api_addr, tls = app_config.tls.enabled, "collector listening");
    info!(%metrics_addr, "collector metrics listening");

    let shutdown_tx_for_signal = shutdown_tx.clone();
    tokio::spawn(async move {
        shutdown.await;
        let _ = shutdown_tx_for_signal.send(true);
    });

    let mut api_task: JoinHandle<Result<()>> = if app_config.tls.enabled {
        let tls_config = tls::load_server_config(&app_config.tls)?;
        let api_shutdown = shutdown_rx.clone();
        tokio::spawn(tls::serve_tls(api_listener, app, tls_config, api_shutdown))
    } else {
        let mut api_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            axum::serve(api_listener, app)
                .with_graceful_shutdown(async move {
                    let _ = api_shutdown.wait_for(|stop| *stop).await;
                })
                .await
                .map_err(anyhow::Error::from)
        })
    };

    let mut metrics_shutdown = shutdown_rx.clone();
    let mut metrics_task: JoinHandle<Result<()>> = tokio::spawn(async move {
        axum::serve(metrics_listener, metrics_app)
            .with_graceful_shutdown(async move {
                let _ = metrics_shutdown.wait_for(|stop| *stop).await;
            })
            .await
            .map_err(anyhow::Error::from)
    });

    // Whichever listener exits first stops the other one and the projectors.
    let (first_name, first_res) = tokio::select! {
        res = &mut api_task => ("api", res),
        res = &mut metrics_task => ("metrics", res),
    };
    let _ = shutdown_tx.send(true);

    let (second_name, second_task) = if first_name == "api" {
        ("metrics", metrics_task)
    } else {
        ("api", api_task)
    };
    let first_res = flatten(first_name, first_res);
    let second_res = flatten(second_name, second_task.await);
    let projector_res = projector_pool.join().await;
    db_pool.close().await;
    info!("collector stopped");

    first_res?;
    second_res?;
    projector_res
}

fn flatten(
    name: &str,
    res: std::result::Result<Result<()>, tokio::task::JoinError>,
) -> Result<()> {
    match res {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => {
            error!(listener = name, error = %err, "collector server failed");
            Err(err.context(format!("collector {name} server failed")))
        }
        Err(err) => Err(anyhow::anyhow!("collector {name} task failed: {err}")),
    }
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json())
        .init();
}

async fn shutdown_signal() {
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
        _ = ctrl_c => {
            info!("received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("received SIGTERM, shutting down");
        },
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
}
