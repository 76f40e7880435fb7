use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub discovery_interval_secs: u64,
    #[serde(default)]
    pub ssh_address: String,
    pub machine_id_path: String,
    #[serde(default)]
    pub hostname: Option<String>,
    pub metrics_host: String,
    pub metrics_port: u16,
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub cloud: CloudConfig,
    #[serde(default)]
    pub sap: SapConfig,
    #[serde(default)]
    pub subscription: SubscriptionConfig,
}

/// Where and how discovery results are published.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    /// Publish results at all; when false probes still run and feed liveness.
    pub enabled: bool,
    /// Base URL of the collector.
    pub host: String,
    pub mtls_enabled: bool,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
    pub ca_path: Option<String>,
    pub timeout_secs: u64,
    pub allow_insecure_http: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_collector_host(),
            mtls_enabled: false,
            cert_path: None,
            key_path: None,
            ca_path: None,
            timeout_secs: default_collector_timeout_secs(),
            allow_insecure_http: false,
        }
    }
}

impl CollectorConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.host.trim().is_empty() {
            anyhow::bail!("collector.host cannot be empty");
        }
        if self.timeout_secs == 0 {
            anyhow::bail!("collector.timeout_secs must be > 0");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    pub cibadmin_path: String,
    pub crm_mon_path: String,
    pub corosync_key_path: String,
    pub sbd_path: String,
    pub sbd_config_path: String,
    pub command_timeout_secs: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            cibadmin_path: "/usr/sbin/cibadmin".into(),
            crm_mon_path: "/usr/sbin/crm_mon".into(),
            corosync_key_path: "/etc/corosync/authkey".into(),
            sbd_path: "/usr/sbin/sbd".into(),
            sbd_config_path: "/etc/sysconfig/sbd".into(),
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CloudConfig {
    pub dmidecode_path: String,
    pub metadata_timeout_secs: u64,
    pub azure_metadata_url: String,
    pub aws_metadata_url: String,
    pub gcp_metadata_url: String,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            dmidecode_path: "dmidecode".into(),
            metadata_timeout_secs: default_metadata_timeout_secs(),
            azure_metadata_url: default_azure_metadata_url(),
            aws_metadata_url: default_aws_metadata_url(),
            gcp_metadata_url: default_gcp_metadata_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SapConfig {
    /// Root of the SAP installation tree (`/usr/sap/<SID>/<instance>`).
    pub install_root: String,
}

impl Default for SapConfig {
    fn default() -> Self {
        Self {
            install_root: "/usr/sap".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionConfig {
    pub suseconnect_path: String,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            suseconnect_path: "/usr/bin/SUSEConnect".into(),
        }
    }
}

fn default_collector_host() -> String {
    "https://127.0.0.1:8081".into()
}

fn default_collector_timeout_secs() -> u64 {
    10
}

fn default_command_timeout_secs() -> u64 {
    30
}

fn default_metadata_timeout_secs() -> u64 {
    5
}

fn default_azure_metadata_url() -> String {
    "http://169.254.169.254".into()
}

fn default_aws_metadata_url() -> String {
    "http://169.254.169.254".into()
}

fn default_gcp_metadata_url() -> String {
    "http://metadata.google.internal".into()
}

// (ENV_NAME, config_key)
const ENV_OVERRIDES: &[(&str, &str)] = &[
    (
        "SAPWATCH_AGENT_DISCOVERY_INTERVAL_SECS",
        "discovery_interval_secs",
    ),
    ("SAPWATCH_AGENT_SSH_ADDRESS", "ssh_address"),
    ("SAPWATCH_AGENT_MACHINE_ID_PATH", "machine_id_path"),
    ("SAPWATCH_AGENT_HOSTNAME", "hostname"),
    ("SAPWATCH_AGENT_METRICS_HOST", "metrics_host"),
    ("SAPWATCH_AGENT_METRICS_PORT", "metrics_port"),
    ("SAPWATCH_AGENT_COLLECTOR_ENABLED", "collector.enabled"),
    ("SAPWATCH_AGENT_COLLECTOR_HOST", "collector.host"),
    ("SAPWATCH_AGENT_COLLECTOR_MTLS_ENABLED", "collector.mtls_enabled"),
    ("SAPWATCH_AGENT_COLLECTOR_CERT_PATH", "collector.cert_path"),
    ("SAPWATCH_AGENT_COLLECTOR_KEY_PATH", "collector.key_path"),
    ("SAPWATCH_AGENT_COLLECTOR_CA_PATH", "collector.ca_path"),
    ("SAPWATCH_AGENT_COLLECTOR_TIMEOUT_SECS", "collector.timeout_secs"),
    (
        "SAPWATCH_AGENT_COLLECTOR_ALLOW_INSECURE_HTTP",
        "collector.allow_insecure_http",
    ),
    ("SAPWATCH_AGENT_CLUSTER_CIBADMIN_PATH", "cluster.cibadmin_path"),
    ("SAPWATCH_AGENT_CLUSTER_CRM_MON_PATH", "cluster.crm_mon_path"),
    (
        "SAPWATCH_AGENT_CLUSTER_COROSYNC_KEY_PATH",
        "cluster.corosync_key_path",
    ),
    ("SAPWATCH_AGENT_CLUSTER_SBD_PATH", "cluster.sbd_path"),
    (
        "SAPWATCH_AGENT_CLUSTER_SBD_CONFIG_PATH",
        "cluster.sbd_config_path",
    ),
    (
        "SAPWATCH_AGENT_CLUSTER_COMMAND_TIMEOUT_SECS",
        "cluster.command_timeout_secs",
    ),
    ("SAPWATCH_AGENT_CLOUD_DMIDECODE_PATH", "cloud.dmidecode_path"),
    (
        "SAPWATCH_AGENT_CLOUD_METADATA_TIMEOUT_SECS",
        "cloud.metadata_timeout_secs",
    ),
    (
        "SAPWATCH_AGENT_CLOUD_AZURE_METADATA_URL",
        "cloud.azure_metadata_url",
    ),
    ("SAPWATCH_AGENT_CLOUD_AWS_METADATA_URL", "cloud.aws_metadata_url"),
    ("SAPWATCH_AGENT_CLOUD_GCP_METADATA_URL", "cloud.gcp_metadata_url"),
    ("SAPWATCH_AGENT_SAP_INSTALL_ROOT", "sap.install_root"),
    (
        "SAPWATCH_AGENT_SUBSCRIPTION_SUSECONNECT_PATH",
        "subscription.suseconnect_path",
    ),
];

pub fn load() -> anyhow::Result<AppConfig> {
    let cluster = ClusterConfig::default();
    let cloud = CloudConfig::default();

    let mut builder = config::Config::builder()
        .add_source(config::File::with_name("config").required(false))
        .set_default("discovery_interval_secs", 120)?
        .set_default("ssh_address", "")?
        .set_default("machine_id_path", "/etc/machine-id")?
        .set_default("hostname", Option::<String>::None)?
        .set_default("metrics_host", "127.0.0.1")?
        .set_default("metrics_port", 9092)?
        .set_default("collector.enabled", true)?
        .set_default("collector.host", default_collector_host())?
        .set_default("collector.mtls_enabled", false)?
        .set_default("collector.cert_path", Option::<String>::None)?
        .set_default("collector.key_path", Option::<String>::None)?
        .set_default("collector.ca_path", Option::<String>::None)?
        .set_default("collector.timeout_secs", default_collector_timeout_secs())?
        .set_default("collector.allow_insecure_http", false)?
        .set_default("cluster.cibadmin_path", cluster.cibadmin_path)?
        .set_default("cluster.crm_mon_path", cluster.crm_mon_path)?
        .set_default("cluster.corosync_key_path", cluster.corosync_key_path)?
        .set_default("cluster.sbd_path", cluster.sbd_path)?
        .set_default("cluster.sbd_config_path", cluster.sbd_config_path)?
        .set_default("cluster.command_timeout_secs", cluster.command_timeout_secs)?
        .set_default("cloud.dmidecode_path", cloud.dmidecode_path)?
        .set_default("cloud.metadata_timeout_secs", cloud.metadata_timeout_secs)?
        .set_default("cloud.azure_metadata_url", cloud.azure_metadata_url)?
        .set_default("cloud.aws_metadata_url", cloud.aws_metadata_url)?
        .set_default("cloud.gcp_metadata_url", cloud.gcp_metadata_url)?
        .set_default("sap.install_root", SapConfig::default().install_root)?
        .set_default(
            "subscription.suseconnect_path",
            SubscriptionConfig::default().suseconnect_path,
        )?;

    // Override with single-underscore environment variables.
    for (env_key, cfg_key) in ENV_OVERRIDES {
        if let Ok(value) = env::var(env_key) {
            builder = builder.set_override(cfg_key, value)?;
        }
    }

    let app: AppConfig = builder.build()?.try_deserialize()?;
    app.validate()?;
    Ok(app)
}

impl AppConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.discovery_interval_secs == 0 {
            anyhow::bail!("discovery_interval_secs must be > 0");
        }
        if self.machine_id_path.trim().is_empty() {
            anyhow::bail!("machine_id_path cannot be empty");
        }
        if self.cluster.command_timeout_secs == 0 {
            anyhow::bail!("cluster.command_timeout_secs must be > 0");
        }
        if self.cloud.metadata_timeout_secs == 0 {
            anyhow::bail!("cloud.metadata_timeout_secs must be > 0");
        }
        if self.collector.enabled {
            self.collector.validate()?;
        }
        Ok(())
    }

    pub fn discovery_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.discovery_interval_secs)
    }

    /// Upper bound for every local admin tool the probes execute.
    pub fn command_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cluster.command_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for (env_key, _) in ENV_OVERRIDES {
            unsafe { env::remove_var(env_key) };
        }
    }

    #[test]
    #[serial]
    fn defaults_apply_without_file_or_env() {
        clear_env();
        let cfg = load().expect("defaults load");
        assert_eq!(cfg.discovery_interval_secs, 120);
        assert_eq!(cfg.machine_id_path, "/etc/machine-id");
        assert_eq!(cfg.metrics_port, 9092);
        assert!(cfg.collector.enabled);
        assert!(!cfg.collector.mtls_enabled);
        assert_eq!(cfg.cluster.cibadmin_path, "/usr/sbin/cibadmin");
        assert_eq!(cfg.cluster.sbd_config_path, "/etc/sysconfig/sbd");
        assert_eq!(cfg.sap.install_root, "/usr/sap");
        assert!(cfg.hostname.is_none());
    }

    #[test]
    #[serial]
    fn env_overrides_nested_keys() {
        clear_env();
        unsafe {
            env::set_var("SAPWATCH_AGENT_DISCOVERY_INTERVAL_SECS", "15");
            env::set_var("SAPWATCH_AGENT_COLLECTOR_HOST", "https://collector:8443");
            env::set_var("SAPWATCH_AGENT_COLLECTOR_MTLS_ENABLED", "true");
            env::set_var("SAPWATCH_AGENT_HOSTNAME", "vmhana01");
        }
        let cfg = load().expect("load with env");
        clear_env();

        assert_eq!(cfg.discovery_interval_secs, 15);
        assert_eq!(cfg.collector.host, "https://collector:8443");
        assert!(cfg.collector.mtls_enabled);
        assert_eq!(cfg.hostname.as_deref(), Some("vmhana01"));
    }

    #[test]
    #[serial]
    fn zero_interval_is_rejected() {
        clear_env();
        unsafe { env::set_var("SAPWATCH_AGENT_DISCOVERY_INTERVAL_SECS", "0") };
        let err = load().expect_err("zero interval");
        clear_env();
        assert!(err.to_string().contains("discovery_interval_secs"));
    }
}
