//! Wire DTOs of the collector HTTP API, shared by the agent and the collector.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /api/collect_data`.
///
/// `discovery_type` stays a plain string on the wire so the collector can
/// reject unknown tags with its own error code instead of a generic JSON
/// rejection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectRequest {
    /// Publishing agent.
    pub agent_id: String,
    /// Discovery type tag.
    pub discovery_type: String,
    /// Type-specific payload.
    pub payload: Value,
}

/// Acknowledgement returned with `202 Accepted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectAck {
    /// Always `ok`.
    pub stored: String,
}

impl CollectAck {
    /// Acknowledgement for a stored event.
    pub fn ok() -> Self {
        Self {
            stored: "ok".to_string(),
        }
    }
}

/// Error payload returned by the collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human readable message.
    pub error: String,
    /// Stable machine readable code.
    pub code: String,
}

/// Classification of a SAP HANA cluster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClusterType {
    /// Topology agent plus the SAPHana agent.
    #[serde(rename = "HANA scale-up")]
    HanaScaleUp,
    /// Topology agent plus the SAPHanaController agent.
    #[serde(rename = "HANA scale-out")]
    HanaScaleOut,
    /// Anything else.
    #[default]
    #[serde(rename = "Unknown")]
    Unknown,
}

impl ClusterType {
    /// Returns the display and storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterType::HanaScaleUp => "HANA scale-up",
            ClusterType::HanaScaleOut => "HANA scale-out",
            ClusterType::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ClusterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClusterType {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "HANA scale-up" => Ok(ClusterType::HanaScaleUp),
            "HANA scale-out" => Ok(ClusterType::HanaScaleOut),
            "Unknown" => Ok(ClusterType::Unknown),
            other => Err(format!("unknown cluster type: {other}")),
        }
    }
}

/// Row of the cluster list read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterListEntry {
    /// Cluster id.
    pub id: String,
    /// Cluster name.
    pub name: String,
    /// Detected cluster type.
    pub cluster_type: ClusterType,
    /// HANA SID, empty when unknown.
    pub sid: String,
    /// Configured resources.
    pub resources_number: u32,
    /// Configured nodes.
    pub hosts_number: u32,
    /// Another cluster in the same result set shares this name.
    pub has_duplicated_name: bool,
    /// Last projection time.
    pub updated_at: DateTime<Utc>,
}

/// Row of the host list read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostListEntry {
    /// Agent id owning the host.
    pub agent_id: String,
    /// Host name, empty until the first host event.
    pub hostname: String,
    /// Operating system.
    pub os_version: String,
    /// Interface addresses.
    pub ip_addresses: Vec<String>,
    /// Logical CPUs.
    pub cpu_count: u32,
    /// CPU sockets.
    pub socket_count: u32,
    /// Total memory in MiB.
    pub total_memory_mb: u64,
    /// Agent version.
    pub agent_version: String,
    /// SSH address.
    pub ssh_address: String,
    /// Cluster the host belongs to.
    pub cluster_id: Option<String>,
    /// Cloud provider name.
    pub cloud_provider: Option<String>,
    /// SIDs installed on the host.
    pub sap_systems: Vec<String>,
    /// Last projection time.
    pub updated_at: DateTime<Utc>,
}

/// Last processed event per agent and discovery type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSeenEntry {
    /// Agent id.
    pub agent_id: String,
    /// Discovery type tag.
    pub discovery_type: String,
    /// Last processed event id.
    pub event_id: i64,
    /// When that event was projected.
    pub seen_at: DateTime<Utc>,
}

/// Collector health report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `ok` or `degraded`.
    pub status: String,
    /// Database reachable.
    pub database: bool,
    /// Events waiting for a projector.
    pub queue_depth: usize,
}
