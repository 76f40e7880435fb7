use std::path::Path;

use anyhow::Context;
use uuid::Uuid;

use crate::config::AppConfig;

/// Who this agent is; built once at startup and shared with probes and the
/// collector client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentIdentity {
    pub agent_id: Uuid,
    pub machine_id: String,
    pub hostname: String,
}

impl AgentIdentity {
    pub fn new(
        machine_id: impl Into<String>,
        hostname: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let machine_id = machine_id.into().trim().to_string();
        Ok(Self {
            agent_id: agent_id(&machine_id)?,
            machine_id,
            hostname: hostname.into(),
        })
    }

    pub fn load(cfg: &AppConfig) -> anyhow::Result<Self> {
        let machine_id = read_machine_id(Path::new(&cfg.machine_id_path))?;
        let hostname = match cfg.hostname.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => sysinfo::System::host_name()
                .filter(|name| !name.trim().is_empty())
                .context("unable to determine the system hostname")?,
        };
        Self::new(machine_id, hostname)
    }
}

/// The first 16 bytes of the machine id, stamped as a version 4 UUID. Agents
/// already registered with a collector keep the id they have always reported.
fn agent_id(machine_id: &str) -> anyhow::Result<Uuid> {
    let bytes: [u8; 16] = machine_id
        .as_bytes()
        .get(..16)
        .and_then(|head| head.try_into().ok())
        .with_context(|| {
            format!(
                "machine id {machine_id:?} is shorter than 16 bytes; cannot derive the agent id"
            )
        })?;
    Ok(uuid::Builder::from_random_bytes(bytes).into_uuid())
}

fn read_machine_id(path: &Path) -> anyhow::Result<String> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read machine id from {}", path.display()))?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        anyhow::bail!("machine id file {} is empty", path.display());
    }
    Ok(trimmed.to_string())
}
