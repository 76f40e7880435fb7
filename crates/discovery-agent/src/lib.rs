use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use tracing::warn;

pub mod collector_client;
pub mod config;
pub mod identity;
pub mod liveness;
pub mod probes;
pub mod runner;
pub mod scheduler;
pub mod telemetry;
pub mod version;

#[cfg(test)]
pub mod test_support;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const AGENT_VERSION_HEADER: &str = "x-agent-version";
pub const AGENT_BUILD_HEADER: &str = "x-agent-build";

pub fn validate_collector_url(cfg: &config::CollectorConfig) -> anyhow::Result<()> {
    let url = reqwest::Url::parse(&cfg.host)
        .with_context(|| format!("invalid collector.host {}", cfg.host))?;
    match url.scheme() {
        "https" => Ok(()),
        "http" if cfg.allow_insecure_http => {
            warn!(
                collector = %cfg.host,
                "insecure HTTP collector URL in use; traffic will be unencrypted"
            );
            Ok(())
        }
        "http" => anyhow::bail!(
            "insecure collector URL not allowed: {}; set collector.allow_insecure_http=true to override",
            cfg.host
        ),
        other => anyhow::bail!("unsupported URL scheme: {}", other),
    }
}

fn build_agent_headers() -> anyhow::Result<HeaderMap> {
    if version::VERSION.trim().is_empty() {
        anyhow::bail!("agent version metadata missing; refusing to start");
    }

    let mut headers = HeaderMap::new();
    headers.insert(
        AGENT_VERSION_HEADER,
        HeaderValue::from_str(version::VERSION).context("invalid agent version header value")?,
    );
    headers.insert(
        AGENT_BUILD_HEADER,
        HeaderValue::from_str(version::GIT_SHA).context("invalid agent build header value")?,
    );

    Ok(headers)
}
