use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::{
    cloud::CloudInstance, cluster::ClusterSnapshot, host::HostDiscovery, sap::SapSystem,
    subscription::Subscription,
};

/// Tag identifying which probe produced a payload.
///
/// The set is closed: the collector rejects any tag it cannot map to one of
/// these variants instead of storing an opaque document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DiscoveryType {
    /// Cloud provider identification and metadata.
    Cloud,
    /// Host inventory (addresses, CPUs, memory, OS).
    Host,
    /// Pacemaker cluster snapshot.
    Cluster,
    /// SAP systems installed on the host.
    SapSystems,
    /// Subscription entitlements.
    Subscription,
}

impl DiscoveryType {
    /// Every tag, in the order the agent registers its probes.
    pub const ALL: [DiscoveryType; 5] = [
        DiscoveryType::Cluster,
        DiscoveryType::SapSystems,
        DiscoveryType::Cloud,
        DiscoveryType::Subscription,
        DiscoveryType::Host,
    ];

    /// Returns the canonical wire tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoveryType::Cloud => "cloud_discovery",
            DiscoveryType::Host => "host_discovery",
            DiscoveryType::Cluster => "cluster_discovery",
            DiscoveryType::SapSystems => "sap_discovery",
            DiscoveryType::Subscription => "subscription_discovery",
        }
    }
}

impl fmt::Display for DiscoveryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiscoveryType {
    type Err = PayloadError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "cloud_discovery" => Ok(DiscoveryType::Cloud),
            "host_discovery" => Ok(DiscoveryType::Host),
            // older agents tagged clusters as ha_cluster_discovery
            "cluster_discovery" | "ha_cluster_discovery" => Ok(DiscoveryType::Cluster),
            "sap_discovery" | "sap_system_discovery" => Ok(DiscoveryType::SapSystems),
            "subscription_discovery" => Ok(DiscoveryType::Subscription),
            other => Err(PayloadError::UnknownType(other.to_string())),
        }
    }
}

impl Serialize for DiscoveryType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DiscoveryType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Errors raised while mapping a tag and a raw document to a typed payload.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    /// The tag is not one of the known discovery types.
    #[error("unknown discovery type: {0}")]
    UnknownType(String),
    /// The document does not decode into the shape required by its tag.
    #[error("invalid {discovery_type} payload: {reason}")]
    Invalid {
        /// Declared discovery type.
        discovery_type: DiscoveryType,
        /// Human readable decode failure.
        reason: String,
    },
}

/// Typed payload produced by a probe, one variant per [`DiscoveryType`].
#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryPayload {
    /// Host inventory.
    Host(HostDiscovery),
    /// Cluster snapshot.
    Cluster(Box<ClusterSnapshot>),
    /// Cloud instance (possibly `unknown`).
    Cloud(CloudInstance),
    /// SAP systems found on the host (possibly empty).
    SapSystems(Vec<SapSystem>),
    /// Subscription entries.
    Subscriptions(Vec<Subscription>),
}

impl DiscoveryPayload {
    /// Decodes `value` with the single schema registered for `discovery_type`.
    pub fn decode(discovery_type: DiscoveryType, value: Value) -> Result<Self, PayloadError> {
        let invalid = |reason: String| PayloadError::Invalid {
            discovery_type,
            reason,
        };

        match discovery_type {
            DiscoveryType::Host => serde_json::from_value::<HostDiscovery>(value)
                .map(DiscoveryPayload::Host)
                .map_err(|err| invalid(err.to_string())),
            DiscoveryType::Cluster => {
                let snapshot = serde_json::from_value::<ClusterSnapshot>(value)
                    .map_err(|err| invalid(err.to_string()))?;
                if snapshot.id.trim().is_empty() {
                    return Err(invalid("cluster id cannot be empty".to_string()));
                }
                Ok(DiscoveryPayload::Cluster(Box::new(snapshot)))
            }
            DiscoveryType::Cloud => serde_json::from_value::<CloudInstance>(value)
                .map(DiscoveryPayload::Cloud)
                .map_err(|err| invalid(err.to_string())),
            DiscoveryType::SapSystems => serde_json::from_value::<Vec<SapSystem>>(value)
                .map(DiscoveryPayload::SapSystems)
                .map_err(|err| invalid(err.to_string())),
            DiscoveryType::Subscription => serde_json::from_value::<Vec<Subscription>>(value)
                .map(DiscoveryPayload::Subscriptions)
                .map_err(|err| invalid(err.to_string())),
        }
    }

    /// Tag matching this payload's variant.
    pub fn discovery_type(&self) -> DiscoveryType {
        match self {
            DiscoveryPayload::Host(_) => DiscoveryType::Host,
            DiscoveryPayload::Cluster(_) => DiscoveryType::Cluster,
            DiscoveryPayload::Cloud(_) => DiscoveryType::Cloud,
            DiscoveryPayload::SapSystems(_) => DiscoveryType::SapSystems,
            DiscoveryPayload::Subscriptions(_) => DiscoveryType::Subscription,
        }
    }

    /// Serializes the inner payload without any variant wrapper.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

impl Serialize for DiscoveryPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DiscoveryPayload::Host(host) => host.serialize(serializer),
            DiscoveryPayload::Cluster(cluster) => cluster.serialize(serializer),
            DiscoveryPayload::Cloud(cloud) => cloud.serialize(serializer),
            DiscoveryPayload::SapSystems(systems) => systems.serialize(serializer),
            DiscoveryPayload::Subscriptions(entries) => entries.serialize(serializer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tags_parse_canonical_and_legacy_names() {
        for discovery_type in DiscoveryType::ALL {
            let parsed: DiscoveryType = discovery_type.as_str().parse().expect("parse");
            assert_eq!(parsed, discovery_type);
        }
        assert_eq!(
            "ha_cluster_discovery".parse::<DiscoveryType>().expect("legacy"),
            DiscoveryType::Cluster
        );
        assert_eq!(
            "sap_system_discovery".parse::<DiscoveryType>().expect("legacy"),
            DiscoveryType::SapSystems
        );
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let err = "disk_discovery".parse::<DiscoveryType>().expect_err("unknown");
        assert!(matches!(err, PayloadError::UnknownType(ref tag) if tag == "disk_discovery"));
    }

    #[test]
    fn cluster_payload_requires_cluster_shape() {
        let err = DiscoveryPayload::decode(DiscoveryType::Cluster, json!({"hostname": "vm1"}))
            .expect_err("not a cluster");
        assert!(err.to_string().starts_with("invalid cluster_discovery payload"));
    }

    #[test]
    fn cluster_payload_rejects_empty_id() {
        let value = json!({
            "cib": {"configuration": {}},
            "crmmon": {},
            "id": "  ",
            "name": "hana"
        });
        let err = DiscoveryPayload::decode(DiscoveryType::Cluster, value).expect_err("empty id");
        assert!(err.to_string().contains("cluster id cannot be empty"));
    }

    #[test]
    fn payload_serializes_without_variant_wrapper() {
        let payload = DiscoveryPayload::SapSystems(Vec::new());
        assert_eq!(payload.to_value().expect("value"), json!([]));
        assert_eq!(payload.discovery_type(), DiscoveryType::SapSystems);
    }
}
