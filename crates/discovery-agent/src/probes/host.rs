use std::path::{Path, PathBuf};

use async_trait::async_trait;
use common::{DiscoveryPayload, DiscoveryType, host::HostDiscovery};
use sysinfo::System;

use super::{DiscoveryProbe, ProbeOutcome};
use crate::{identity::AgentIdentity, version};

const CPUINFO_PATH: &str = "/proc/cpuinfo";

pub struct HostProbe {
    hostname: String,
    ssh_address: String,
    cpuinfo_path: PathBuf,
}

impl HostProbe {
    pub fn new(identity: &AgentIdentity, ssh_address: &str) -> Self {
        Self {
            hostname: identity.hostname.clone(),
            ssh_address: ssh_address.to_string(),
            cpuinfo_path: PathBuf::from(CPUINFO_PATH),
        }
    }

    pub fn with_cpuinfo_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cpuinfo_path = path.into();
        self
    }

    fn collect(&self) -> anyhow::Result<HostDiscovery> {
        let mut sys = System::new();
        sys.refresh_cpu();
        sys.refresh_memory();

        Ok(HostDiscovery {
            ssh_address: self.ssh_address.clone(),
            os_version: System::long_os_version().unwrap_or_default(),
            host_ip_addresses: interface_addresses()?,
            hostname: self.hostname.clone(),
            cpu_count: sys.cpus().len() as u32,
            socket_count: socket_count(&self.cpuinfo_path),
            total_memory_mb: sys.total_memory() / (1024 * 1024),
            agent_version: version::VERSION.to_string(),
        })
    }
}

#[async_trait]
impl DiscoveryProbe for HostProbe {
    fn discovery_type(&self) -> DiscoveryType {
        DiscoveryType::Host
    }

    async fn discover(&self) -> anyhow::Result<ProbeOutcome> {
        let host = self.collect()?;
        Ok(ProbeOutcome::found(
            format!("Host with name: {} successfully discovered", host.hostname),
            DiscoveryPayload::Host(host),
        ))
    }
}

fn interface_addresses() -> anyhow::Result<Vec<String>> {
    let interfaces = if_addrs::get_if_addrs()
        .map_err(|err| anyhow::anyhow!("failed to enumerate network interfaces: {err}"))?;
    Ok(interfaces
        .into_iter()
        .map(|iface| iface.ip().to_string())
        .collect())
}

/// Highest `physical id` in cpuinfo plus one; 0 when the file or field is absent.
fn socket_count(cpuinfo: &Path) -> u32 {
    std::fs::read_to_string(cpuinfo)
        .map(|raw| parse_socket_count(&raw))
        .unwrap_or(0)
}

fn parse_socket_count(cpuinfo: &str) -> u32 {
    cpuinfo
        .lines()
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            (key.trim() == "physical id")
                .then(|| value.trim().parse::<u32>().ok())
                .flatten()
        })
        .max()
        .map(|id| id + 1)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_identity;
    use std::io::Write;

    #[test]
    fn socket_count_uses_highest_physical_id() {
        let cpuinfo = "processor\t: 0\nphysical id\t: 0\n\nprocessor\t: 1\nphysical id\t: 1\n\nprocessor\t: 2\nphysical id\t: 1\n";
        assert_eq!(parse_socket_count(cpuinfo), 2);
        assert_eq!(parse_socket_count("processor\t: 0\n"), 0);
    }

    #[tokio::test]
    async fn host_probe_reports_identity_and_inventory() {
        let mut cpuinfo = tempfile::NamedTempFile::new().expect("tempfile");
        write!(cpuinfo, "processor\t: 0\nphysical id\t: 3\n").expect("write");

        let probe = HostProbe::new(&test_identity(), "10.0.0.5").with_cpuinfo_path(cpuinfo.path());
        let outcome = probe.discover().await.expect("host discovery");

        assert_eq!(outcome.summary, "Host with name: vmhana01 successfully discovered");
        let Some(DiscoveryPayload::Host(host)) = outcome.payload else {
            panic!("expected host payload");
        };
        assert_eq!(host.hostname, "vmhana01");
        assert_eq!(host.ssh_address, "10.0.0.5");
        assert_eq!(host.socket_count, 4);
        assert_eq!(host.agent_version, version::VERSION);
        assert!(host.cpu_count > 0);
    }
}
