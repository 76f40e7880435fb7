#![allow(dead_code)]

use std::io::Write;
use std::path::Path;

use discovery_agent::config;
use tempfile::{NamedTempFile, TempDir};

/// Files backing an agent started from a test.
pub struct AgentFixture {
    pub machine_id: NamedTempFile,
    pub sap_root: TempDir,
}

impl AgentFixture {
    pub fn new() -> Self {
        let mut machine_id = NamedTempFile::new().expect("machine id file");
        writeln!(machine_id, "4c6f1e0a2b9d4e8f9a7b6c5d4e3f2a1b").expect("write machine id");
        let sap_root = tempfile::tempdir().expect("sap root");
        Self {
            machine_id,
            sap_root,
        }
    }

    pub fn add_sap_instance(&self, sid: &str, instance: &str) {
        std::fs::create_dir_all(self.sap_root.path().join(sid).join(instance))
            .expect("sap instance dir");
    }

    /// Config pointing every local admin tool at a missing binary so only the
    /// SAP, cloud and host probes produce payloads.
    pub fn config(&self, collector_host: &str) -> config::AppConfig {
        let missing = |name: &str| {
            Path::new("/nonexistent/sapwatch-itest")
                .join(name)
                .display()
                .to_string()
        };

        config::AppConfig {
            discovery_interval_secs: 60,
            ssh_address: "10.0.0.5".into(),
            machine_id_path: self.machine_id.path().display().to_string(),
            hostname: Some("vmhana01".into()),
            metrics_host: "127.0.0.1".into(),
            // Let the OS pick an ephemeral port to avoid collisions in CI.
            metrics_port: 0,
            collector: config::CollectorConfig {
                host: collector_host.into(),
                timeout_secs: 2,
                allow_insecure_http: true,
                ..config::CollectorConfig::default()
            },
            cluster: config::ClusterConfig {
                cibadmin_path: missing("cibadmin"),
                crm_mon_path: missing("crm_mon"),
                corosync_key_path: missing("authkey"),
                sbd_path: missing("sbd"),
                sbd_config_path: missing("sbd.conf"),
                command_timeout_secs: 2,
            },
            cloud: config::CloudConfig {
                dmidecode_path: missing("dmidecode"),
                metadata_timeout_secs: 1,
                azure_metadata_url: "http://127.0.0.1:1".into(),
                aws_metadata_url: "http://127.0.0.1:1".into(),
                gcp_metadata_url: "http://127.0.0.1:1".into(),
            },
            sap: config::SapConfig {
                install_root: self.sap_root.path().display().to_string(),
            },
            subscription: config::SubscriptionConfig {
                suseconnect_path: missing("SUSEConnect"),
            },
        }
    }
}
