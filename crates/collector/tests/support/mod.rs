#![allow(dead_code)]

use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Request as HttpRequest, StatusCode},
};
use collector::{
    app_state::AppState,
    config::{LimitsConfig, ProjectorConfig},
    http::{build_metrics_router, build_router},
    metrics::{init_metrics_recorder, record_build_info},
    persistence::{self as db, migrations},
    projectors::{self, ProjectorPool, ProjectorRegistry},
    services::CollectorService,
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tokio::sync::watch;
use tower::ServiceExt;

pub struct TestApp {
    pub app: Router,
    pub metrics: Router,
    pub db: db::Db,
    shutdown: watch::Sender<bool>,
    pool: Option<ProjectorPool>,
}

impl TestApp {
    /// Stops the projector workers and waits for them.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(pool) = self.pool.take() {
            pool.join().await.expect("projectors stop");
        }
    }
}

pub async fn setup_app() -> TestApp {
    setup_app_with_limits(LimitsConfig::default()).await
}

pub async fn setup_app_with_limits(limits: LimitsConfig) -> TestApp {
    let db = migrations::init_pool("sqlite::memory:")
        .await
        .expect("pool");
    let outcome = migrations::run_migrations(&db).await.expect("migrations");
    let metrics_handle = init_metrics_recorder();
    record_build_info(&outcome.snapshot);

    let (shutdown, shutdown_rx) = watch::channel(false);
    let (queue, pool) = projectors::start_projectors(
        db.clone(),
        ProjectorRegistry::with_read_models(),
        &ProjectorConfig {
            workers: 2,
            queue_capacity: 16,
        },
        shutdown_rx,
    );

    let state = AppState {
        db: db.clone(),
        collector: CollectorService::new(db.clone(), queue),
        limits,
        metrics_handle,
    };

    TestApp {
        app: build_router(state.clone()).with_state(state.clone()),
        metrics: build_metrics_router().with_state(state),
        db,
        shutdown,
        pool: Some(pool),
    }
}

pub async fn send(app: &Router, request: HttpRequest<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    (status, bytes.to_vec())
}

pub async fn post_raw(app: &Router, uri: &str, body: impl Into<Body>) -> (StatusCode, Value) {
    let request = HttpRequest::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-agent-version", "0.3.0")
        .body(body.into())
        .expect("request");
    let (status, bytes) = send(app, request).await;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

/// Posts one discovery event on the current ingress path.
pub async fn collect(
    app: &Router,
    agent_id: &str,
    discovery_type: &str,
    payload: Value,
) -> (StatusCode, Value) {
    let body = json!({
        "agent_id": agent_id,
        "discovery_type": discovery_type,
        "payload": payload,
    });
    post_raw(app, "/api/v1/collect", body.to_string()).await
}

pub async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let request = HttpRequest::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request");
    let (status, bytes) = send(app, request).await;
    (
        status,
        serde_json::from_slice(&bytes).expect("json response"),
    )
}

/// Polls `uri` until `ready` accepts the JSON body.
pub async fn wait_for_json(app: &Router, uri: &str, ready: impl Fn(&Value) -> bool) -> Value {
    for _ in 0..100 {
        let (status, body) = get_json(app, uri).await;
        if status == StatusCode::OK && ready(&body) {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition on {uri} not reached");
}

pub fn cluster_payload(id: &str, name: &str, sid: &str, agents: &[&str]) -> Value {
    let resources: Vec<Value> = agents
        .iter()
        .enumerate()
        .map(|(idx, agent)| json!({ "id": format!("rsc_{idx}"), "agent": agent, "active": true }))
        .collect();
    json!({
        "id": id,
        "name": name,
        "cib": {
            "configuration": {
                "resources": {
                    "clones": [{
                        "id": "cln_SAPHanaTopology",
                        "primitive": {
                            "id": "rsc_SAPHanaTopology",
                            "class": "ocf",
                            "provider": "suse",
                            "type": "SAPHanaTopology",
                            "instance_attributes": [
                                { "id": "sid", "name": "SID", "value": sid }
                            ]
                        }
                    }]
                }
            }
        },
        "crmmon": {
            "summary": {
                "nodes": { "number": 2 },
                "resources": { "number": agents.len() }
            },
            "clones": [{ "id": "cln_hana", "resources": resources }]
        }
    })
}

pub fn scale_up_cluster(id: &str, name: &str, sid: &str) -> Value {
    cluster_payload(
        id,
        name,
        sid,
        &["ocf::suse:SAPHanaTopology", "ocf::suse:SAPHana"],
    )
}

pub fn host_payload(hostname: &str) -> Value {
    json!({
        "ssh_address": "10.0.0.10",
        "os_version": "SUSE Linux Enterprise Server 15 SP5",
        "host_ip_addresses": ["10.0.0.10"],
        "hostname": hostname,
        "cpu_count": 8,
        "socket_count": 2,
        "total_memory_mb": 65536,
        "agent_version": "0.3.0"
    })
}

pub fn sap_payload(sids: &[&str]) -> Value {
    Value::Array(
        sids.iter()
            .map(|sid| json!({ "sid": sid, "system_type": "database", "instances": [] }))
            .collect(),
    )
}
