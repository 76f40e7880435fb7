use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use common::{
    DiscoveryPayload, DiscoveryType,
    api::CollectRequest,
};
use reqwest::StatusCode;
use rustls::{
    RootCertStore,
    pki_types::{CertificateDer, pem::PemObject},
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    REQUEST_ID_HEADER, build_agent_headers, config::CollectorConfig, identity::AgentIdentity,
    validate_collector_url,
};

pub const COLLECT_PATH: &str = "/api/collect_data";

/// mTLS material problems detected while building the client.
#[derive(Debug, thiserror::Error)]
pub enum TlsConfigError {
    #[error("you must provide a server ssl certificate to enable mTLS")]
    MissingCertificate,
    #[error("you must provide a key to enable mTLS")]
    MissingKey,
    #[error("you must provide a CA ssl certificate to enable mTLS")]
    MissingCa,
    #[error("failed to read {item} from {path}: {source}")]
    Unreadable {
        item: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid {item} in {path}: {reason}")]
    Invalid {
        item: &'static str,
        path: String,
        reason: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error(
        "agent {agent_id} failed to publish {discovery_type} discovery: status {status}, body: {body}"
    )]
    Rejected {
        agent_id: Uuid,
        discovery_type: DiscoveryType,
        status: StatusCode,
        body: String,
    },
    #[error("agent {agent_id} failed to publish {discovery_type} discovery: {source}")]
    Transport {
        agent_id: Uuid,
        discovery_type: DiscoveryType,
        #[source]
        source: reqwest::Error,
    },
    #[error("agent {agent_id} failed to encode {discovery_type} discovery: {source}")]
    Encode {
        agent_id: Uuid,
        discovery_type: DiscoveryType,
        #[source]
        source: serde_json::Error,
    },
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(
        &self,
        discovery_type: DiscoveryType,
        payload: &DiscoveryPayload,
    ) -> Result<(), PublishError>;
}

pub type DynPublisher = Arc<dyn Publisher>;

/// Publisher used when `collector.enabled` is false; results only feed liveness.
pub struct DisabledPublisher;

#[async_trait]
impl Publisher for DisabledPublisher {
    async fn publish(
        &self,
        discovery_type: DiscoveryType,
        _payload: &DiscoveryPayload,
    ) -> Result<(), PublishError> {
        debug!(%discovery_type, "collector disabled; discovery not published");
        Ok(())
    }
}

#[derive(Clone)]
pub struct CollectorClient {
    client: reqwest::Client,
    collect_url: String,
    agent_id: Uuid,
}

impl CollectorClient {
    /// Builds the HTTP client, loading every piece of TLS material up front.
    pub fn new(cfg: &CollectorConfig, identity: &AgentIdentity) -> anyhow::Result<Self> {
        validate_collector_url(cfg)?;

        let mut builder = reqwest::Client::builder()
            .default_headers(build_agent_headers()?)
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .use_rustls_tls();

        if cfg.mtls_enabled {
            let tls = load_tls_material(cfg)?;
            builder = builder.identity(tls.identity).tls_built_in_root_certs(false);
            for ca in tls.ca {
                builder = builder.add_root_certificate(ca);
            }
        } else if let Some(ca_path) = non_empty(cfg.ca_path.as_deref()) {
            for ca in read_ca(ca_path)? {
                builder = builder.add_root_certificate(ca);
            }
        }

        Ok(Self {
            client: builder.build()?,
            collect_url: collect_url(&cfg.host),
            agent_id: identity.agent_id,
        })
    }

    pub fn collect_url(&self) -> &str {
        &self.collect_url
    }
}

#[async_trait]
impl Publisher for CollectorClient {
    async fn publish(
        &self,
        discovery_type: DiscoveryType,
        payload: &DiscoveryPayload,
    ) -> Result<(), PublishError> {
        let body = CollectRequest {
            agent_id: self.agent_id.to_string(),
            discovery_type: discovery_type.as_str().to_string(),
            payload: payload.to_value().map_err(|source| PublishError::Encode {
                agent_id: self.agent_id,
                discovery_type,
                source,
            })?,
        };
        let request_id = Uuid::new_v4().to_string();

        let res = self
            .client
            .post(&self.collect_url)
            .header(REQUEST_ID_HEADER, &request_id)
            .json(&body)
            .send()
            .await
            .map_err(|source| {
                warn!(%request_id, %discovery_type, ?source, "collect request failed");
                PublishError::Transport {
                    agent_id: self.agent_id,
                    discovery_type,
                    source,
                }
            })?;

        let status = res.status();
        if status != StatusCode::ACCEPTED {
            let body = res.text().await.unwrap_or_default();
            warn!(%request_id, %discovery_type, %status, "collector rejected discovery");
            return Err(PublishError::Rejected {
                agent_id: self.agent_id,
                discovery_type,
                status,
                body,
            });
        }

        debug!(%request_id, %discovery_type, "discovery published");
        Ok(())
    }
}

pub fn collect_url(host: &str) -> String {
    format!("{}{}", host.trim_end_matches('/'), COLLECT_PATH)
}

struct TlsMaterial {
    identity: reqwest::Identity,
    ca: Vec<reqwest::Certificate>,
}

fn load_tls_material(cfg: &CollectorConfig) -> Result<TlsMaterial, TlsConfigError> {
    let cert_path = non_empty(cfg.cert_path.as_deref()).ok_or(TlsConfigError::MissingCertificate)?;
    let key_path = non_empty(cfg.key_path.as_deref()).ok_or(TlsConfigError::MissingKey)?;
    let ca_path = non_empty(cfg.ca_path.as_deref()).ok_or(TlsConfigError::MissingCa)?;

    let mut pem = read_file("certificate", cert_path)?;
    if !pem.ends_with(b"\n") {
        pem.push(b'\n');
    }
    pem.extend(read_file("key", key_path)?);

    let identity = reqwest::Identity::from_pem(&pem).map_err(|err| TlsConfigError::Invalid {
        item: "certificate/key pair",
        path: format!("{cert_path}, {key_path}"),
        reason: err.to_string(),
    })?;

    Ok(TlsMaterial {
        identity,
        ca: read_ca(ca_path)?,
    })
}

/// Parses every certificate in the CA bundle and checks each one is usable
/// as a trust anchor, so bad material fails here and not on first publish.
fn read_ca(path: &str) -> Result<Vec<reqwest::Certificate>, TlsConfigError> {
    let pem = read_file("CA", path)?;
    let invalid = |reason: String| TlsConfigError::Invalid {
        item: "CA",
        path: path.to_string(),
        reason,
    };

    let certs = CertificateDer::pem_slice_iter(&pem)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| invalid(err.to_string()))?;
    if certs.is_empty() {
        return Err(invalid("no certificates found".into()));
    }

    let mut roots = RootCertStore::empty();
    certs
        .iter()
        .map(|der| {
            roots
                .add(der.clone())
                .map_err(|err| invalid(err.to_string()))?;
            reqwest::Certificate::from_der(der).map_err(|err| invalid(err.to_string()))
        })
        .collect()
}

fn read_file(item: &'static str, path: &str) -> Result<Vec<u8>, TlsConfigError> {
    std::fs::read(path).map_err(|source| TlsConfigError::Unreadable {
        item,
        path: path.to_string(),
        source,
    })
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
