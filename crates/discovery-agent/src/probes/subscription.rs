use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use common::{DiscoveryPayload, DiscoveryType, subscription::Subscription};

use super::{DiscoveryProbe, ProbeOutcome, command};

pub struct SubscriptionProbe {
    suseconnect_path: String,
    timeout: Duration,
}

impl SubscriptionProbe {
    pub fn new(suseconnect_path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            suseconnect_path: suseconnect_path.into(),
            timeout,
        }
    }
}

/// Decodes `SUSEConnect --status` output; registration codes are dropped.
pub fn parse_status(raw: &[u8]) -> anyhow::Result<Vec<Subscription>> {
    serde_json::from_slice(raw).context("failed to parse SUSEConnect status")
}

#[async_trait]
impl DiscoveryProbe for SubscriptionProbe {
    fn discovery_type(&self) -> DiscoveryType {
        DiscoveryType::Subscription
    }

    async fn discover(&self) -> anyhow::Result<ProbeOutcome> {
        let out = command::run(&self.suseconnect_path, &["--status"], self.timeout).await?;
        let entries = parse_status(&out)?;
        Ok(ProbeOutcome::found(
            format!("Subscription ({} entries) discovered", entries.len()),
            DiscoveryPayload::Subscriptions(entries),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATUS: &str = r#"[
      {"identifier":"SLES_SAP","version":"15.2","arch":"x86_64","status":"Registered",
       "regcode":"secret","starts_at":"2019-03-20 09:55:32 UTC","expires_at":"2024-03-20 09:55:32 UTC",
       "subscription_status":"ACTIVE","type":"internal"},
      {"identifier":"sle-module-basesystem","version":"15.2","arch":"x86_64","status":"Registered"}
    ]"#;

    #[test]
    fn parses_entries_and_drops_regcode() {
        let entries = parse_status(STATUS.as_bytes()).expect("status");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].identifier, "SLES_SAP");
        assert_eq!(entries[0].kind.as_deref(), Some("internal"));
        assert!(entries[1].expires_at.is_none());

        let value = serde_json::to_value(&entries[0]).expect("serialize");
        assert!(value.get("regcode").is_none());
    }

    #[test]
    fn rejects_non_json_output() {
        let err = parse_status(b"SUSEConnect error: not registered").expect_err("bad json");
        assert!(err.to_string().contains("SUSEConnect"));
    }

    #[tokio::test]
    async fn missing_binary_is_an_error() {
        let probe = SubscriptionProbe::new("/nonexistent/SUSEConnect", Duration::from_secs(5));
        assert!(probe.discover().await.is_err());
    }
}
