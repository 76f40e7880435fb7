use serde::{Deserialize, Serialize};

/// Host inventory reported by the host probe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostDiscovery {
    /// Address operators should use to reach the host over SSH.
    #[serde(default)]
    pub ssh_address: String,
    /// Operating system name and version.
    pub os_version: String,
    /// Every address bound to a local interface.
    pub host_ip_addresses: Vec<String>,
    /// Host name.
    pub hostname: String,
    /// Logical CPUs.
    pub cpu_count: u32,
    /// Physical CPU sockets.
    pub socket_count: u32,
    /// Total memory in MiB.
    pub total_memory_mb: u64,
    /// Version of the agent that produced this payload.
    pub agent_version: String,
}
