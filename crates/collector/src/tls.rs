//! Mutually authenticated HTTPS listener for the ingress API.
//!
//! Agents must present a client certificate issued by the configured CA;
//! connections without one fail the handshake and never reach the router.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto,
    service::TowerToHyperService,
};
use rustls::{
    RootCertStore, ServerConfig,
    pki_types::{CertificateDer, PrivateKeyDer, pem::PemObject},
    server::WebPkiClientVerifier,
};
use tokio::{net::TcpListener, sync::watch};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

use crate::Result;
use crate::config::TlsConfig;

fn install_crypto_provider() {
    // Fails only when a provider is already installed.
    let _ = rustls::crypto::ring::default_provider().install_default();
}

fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>> {
    let certs = CertificateDer::pem_file_iter(path)
        .with_context(|| format!("failed to open certificate file {path}"))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("failed to parse certificates in {path}"))?;
    if certs.is_empty() {
        anyhow::bail!("no certificates found in {path}");
    }
    Ok(certs)
}

fn load_key(path: &str) -> Result<PrivateKeyDer<'static>> {
    PrivateKeyDer::from_pem_file(path)
        .with_context(|| format!("failed to load private key from {path}"))
}

fn required<'a>(value: &'a Option<String>, key: &str) -> Result<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|path| !path.is_empty())
        .with_context(|| format!("{key} is required when tls.enabled=true"))
}

/// Builds the server configuration from the PEM files named in `cfg`.
pub fn load_server_config(cfg: &TlsConfig) -> Result<Arc<ServerConfig>> {
    install_crypto_provider();

    let cert_path = required(&cfg.cert_path, "tls.cert_path")?;
    let key_path = required(&cfg.key_path, "tls.key_path")?;
    let ca_path = required(&cfg.ca_path, "tls.ca_path")?;

    let mut roots = RootCertStore::empty();
    for ca in load_certs(ca_path)? {
        roots
            .add(ca)
            .with_context(|| format!("invalid CA certificate in {ca_path}"))?;
    }
    let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
        .build()
        .context("failed to build client certificate verifier")?;

    let mut config = ServerConfig::builder()
        .with_client_cert_verifier(verifier)
        .with_single_cert(load_certs(cert_path)?, load_key(key_path)?)
        .context("server certificate does not match its private key")?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(Arc::new(config))
}

/// Accepts TLS connections until `shutdown` flips to true. Connections
/// already being served finish on their own tasks.
pub async fn serve_tls(
    listener: TcpListener,
    router: Router,
    config: Arc<ServerConfig>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let acceptor = TlsAcceptor::from(config);
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "tls listener ready");
    }

    loop {
        tokio::select! {
            _ = async { let _ = shutdown.wait_for(|stop| *stop).await; } => break,
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(err) => {
                        warn!(error = %err, "failed to accept connection");
                        continue;
                    }
                };
                tokio::spawn(serve_connection(acceptor.clone(), router.clone(), stream, peer));
            }
        }
    }

    Ok(())
}

async fn serve_connection(
    acceptor: TlsAcceptor,
    router: Router,
    stream: tokio::net::TcpStream,
    peer: SocketAddr,
) {
    let tls = match acceptor.accept(stream).await {
        Ok(tls) => tls,
        Err(err) => {
            debug!(%peer, error = %err, "tls handshake failed");
            return;
        }
    };

    let service = TowerToHyperService::new(router);
    if let Err(err) = auto::Builder::new(TokioExecutor::new())
        .serve_connection(TokioIo::new(tls), service)
        .await
    {
        debug!(%peer, error = %err, "connection closed with error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{BasicConstraints, CertificateParams, IsCa, SanType};

    fn make_ca() -> rcgen::Certificate {
        let mut params = CertificateParams::default();
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            rcgen::KeyUsagePurpose::KeyCertSign,
            rcgen::KeyUsagePurpose::DigitalSignature,
        ];
        rcgen::Certificate::from_params(params).expect("ca params")
    }

    fn make_leaf(dns: &str) -> rcgen::Certificate {
        let mut params = CertificateParams::default();
        params.subject_alt_names = vec![SanType::DnsName(dns.to_string())];
        rcgen::Certificate::from_params(params).expect("leaf params")
    }

    fn write(dir: &tempfile::TempDir, name: &str, contents: &str) -> String {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).expect("write pem");
        path.to_string_lossy().into_owned()
    }

    fn tls_config(dir: &tempfile::TempDir) -> TlsConfig {
        let ca = make_ca();
        let leaf = make_leaf("localhost");
        TlsConfig {
            enabled: true,
            cert_path: Some(write(
                dir,
                "server.pem",
                &leaf.serialize_pem_with_signer(&ca).expect("sign leaf"),
            )),
            key_path: Some(write(dir, "server.key", &leaf.serialize_private_key_pem())),
            ca_path: Some(write(dir, "ca.pem", &ca.serialize_pem().expect("ca pem"))),
        }
    }

    #[test]
    fn loads_signed_material() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = load_server_config(&tls_config(&dir)).expect("server config");
        assert_eq!(config.alpn_protocols.len(), 2);
    }

    #[test]
    fn missing_files_are_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cfg = tls_config(&dir);
        cfg.ca_path = Some(dir.path().join("absent.pem").to_string_lossy().into_owned());

        let err = load_server_config(&cfg).expect_err("missing ca");
        assert!(err.to_string().contains("absent.pem"), "{err:#}");
    }

    #[test]
    fn files_without_certificates_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cfg = tls_config(&dir);
        cfg.cert_path = Some(write(&dir, "empty.pem", ""));

        let err = load_server_config(&cfg).expect_err("empty cert");
        assert!(err.to_string().contains("no certificates"), "{err:#}");
    }

    #[test]
    fn unset_paths_are_rejected() {
        let cfg = TlsConfig {
            enabled: true,
            ..TlsConfig::default()
        };
        let err = load_server_config(&cfg).expect_err("unset paths");
        assert!(err.to_string().contains("tls.cert_path"), "{err:#}");
    }
}
