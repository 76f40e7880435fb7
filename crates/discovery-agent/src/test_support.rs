use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use common::{
    DiscoveryPayload, DiscoveryType,
    cloud::{CloudInstance, CloudProvider},
    cluster::{
        Attribute, CLUSTER_NAME_PROPERTY, Cib, CibConfiguration, ClusterSnapshot, CrmConfig,
        CrmMon, CrmMonNode, CrmMonResource, Sbd, SbdDevice,
    },
    host::HostDiscovery,
};
use reqwest::StatusCode;

use crate::{
    collector_client::{PublishError, Publisher},
    config,
    identity::AgentIdentity,
    probes::{
        DiscoveryProbe, ProbeOutcome,
        cloud::{Detector, DmiReader},
        cluster_source::ClusterSource,
    },
};

pub(crate) fn base_config() -> config::AppConfig {
    config::AppConfig {
        discovery_interval_secs: 1,
        ssh_address: "10.0.0.5".into(),
        machine_id_path: "/etc/machine-id".into(),
        hostname: Some("vmhana01".into()),
        metrics_host: "127.0.0.1".into(),
        metrics_port: 0,
        collector: collector_config("http://127.0.0.1:1"),
        cluster: config::ClusterConfig::default(),
        cloud: config::CloudConfig::default(),
        sap: config::SapConfig::default(),
        subscription: config::SubscriptionConfig::default(),
    }
}

pub(crate) fn collector_config(host: &str) -> config::CollectorConfig {
    config::CollectorConfig {
        host: host.into(),
        timeout_secs: 1,
        allow_insecure_http: true,
        ..config::CollectorConfig::default()
    }
}

pub(crate) fn test_identity() -> AgentIdentity {
    AgentIdentity::new("0123456789abcdef", "vmhana01").expect("test identity")
}

#[derive(Default)]
struct ClusterFailures {
    cib: AtomicBool,
    crm_mon: AtomicBool,
    authkey: AtomicBool,
    sbd: AtomicBool,
}

/// In-memory cluster with one DC node and an optional stonith resource.
#[derive(Clone)]
pub(crate) struct FakeClusterSource {
    cib: Cib,
    crm_mon: CrmMon,
    failures: Arc<ClusterFailures>,
    sbd_calls: Arc<AtomicUsize>,
}

impl Default for FakeClusterSource {
    fn default() -> Self {
        Self::build("default_cluster", None)
    }
}

impl FakeClusterSource {
    pub const AUTHKEY: &'static [u8] = b"corosync-authkey";

    pub fn named(name: &str, stonith_agent: &str) -> Self {
        Self::build(name, Some(stonith_agent))
    }

    fn build(name: &str, stonith_agent: Option<&str>) -> Self {
        let cib = Cib {
            configuration: CibConfiguration {
                crm_config: CrmConfig {
                    cluster_properties: vec![Attribute {
                        id: CLUSTER_NAME_PROPERTY.into(),
                        name: "cluster-name".into(),
                        value: name.into(),
                    }],
                },
                ..CibConfiguration::default()
            },
        };
        let crm_mon = CrmMon {
            version: "2.0.0".into(),
            nodes: vec![CrmMonNode {
                name: "node01".into(),
                id: "1".into(),
                online: true,
                dc: true,
                ..CrmMonNode::default()
            }],
            resources: stonith_agent
                .map(|agent| {
                    vec![CrmMonResource {
                        id: "stonith-sbd".into(),
                        agent: agent.into(),
                        role: "Started".into(),
                        active: true,
                        managed: true,
                        nodes_running_on: 1,
                        ..CrmMonResource::default()
                    }]
                })
                .unwrap_or_default(),
            ..CrmMon::default()
        };
        Self {
            cib,
            crm_mon,
            failures: Arc::new(ClusterFailures::default()),
            sbd_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn fail_cib(&self) {
        self.failures.cib.store(true, Ordering::SeqCst);
    }

    pub fn fail_crm_mon(&self) {
        self.failures.crm_mon.store(true, Ordering::SeqCst);
    }

    pub fn fail_authkey(&self) {
        self.failures.authkey.store(true, Ordering::SeqCst);
    }

    pub fn fail_sbd(&self) {
        self.failures.sbd.store(true, Ordering::SeqCst);
    }

    pub fn sbd_calls(&self) -> usize {
        self.sbd_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClusterSource for FakeClusterSource {
    async fn cib(&self) -> anyhow::Result<Cib> {
        if self.failures.cib.load(Ordering::SeqCst) {
            anyhow::bail!("cibadmin: command not found");
        }
        Ok(self.cib.clone())
    }

    async fn crm_mon(&self) -> anyhow::Result<CrmMon> {
        if self.failures.crm_mon.load(Ordering::SeqCst) {
            anyhow::bail!("crm_mon: connection to cluster failed");
        }
        Ok(self.crm_mon.clone())
    }

    async fn corosync_authkey(&self) -> anyhow::Result<Vec<u8>> {
        if self.failures.authkey.load(Ordering::SeqCst) {
            anyhow::bail!("permission denied: /etc/corosync/authkey");
        }
        Ok(Self::AUTHKEY.to_vec())
    }

    async fn sbd(&self) -> anyhow::Result<Sbd> {
        self.sbd_calls.fetch_add(1, Ordering::SeqCst);
        if self.failures.sbd.load(Ordering::SeqCst) {
            anyhow::bail!("sbd: device not readable");
        }
        Ok(Sbd {
            config: [("SBD_DEVICE".to_string(), "/dev/vdb".to_string())]
                .into_iter()
                .collect(),
            devices: vec![SbdDevice {
                device: "/dev/vdb".into(),
                status: "healthy".into(),
                ..SbdDevice::default()
            }],
        })
    }
}

#[derive(Clone, Copy)]
enum DetectorBehaviour {
    Identify(Option<CloudProvider>),
    FailIdentify,
    FailLoad(CloudProvider),
}

/// Detector counting its identify and load calls.
#[derive(Clone)]
pub(crate) struct FakeDetector {
    behaviour: DetectorBehaviour,
    identify_calls: Arc<AtomicUsize>,
    load_calls: Arc<AtomicUsize>,
}

impl FakeDetector {
    fn with_behaviour(behaviour: DetectorBehaviour) -> Self {
        Self {
            behaviour,
            identify_calls: Arc::new(AtomicUsize::new(0)),
            load_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn new(provider: Option<CloudProvider>) -> Self {
        Self::with_behaviour(DetectorBehaviour::Identify(provider))
    }

    pub fn failing_identify() -> Self {
        Self::with_behaviour(DetectorBehaviour::FailIdentify)
    }

    pub fn failing_load(provider: CloudProvider) -> Self {
        Self::with_behaviour(DetectorBehaviour::FailLoad(provider))
    }

    pub fn identify_calls(&self) -> usize {
        self.identify_calls.load(Ordering::SeqCst)
    }

    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Detector for FakeDetector {
    async fn identify(&self) -> anyhow::Result<Option<CloudProvider>> {
        self.identify_calls.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            DetectorBehaviour::Identify(provider) => Ok(provider),
            DetectorBehaviour::FailIdentify => anyhow::bail!("dmidecode: permission denied"),
            DetectorBehaviour::FailLoad(provider) => Ok(Some(provider)),
        }
    }

    async fn load(&self, _instance: &mut CloudInstance) -> anyhow::Result<()> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            DetectorBehaviour::FailLoad(_) => anyhow::bail!("metadata endpoint unreachable"),
            _ => Ok(()),
        }
    }
}

/// DMI table backed by a map; unknown keywords fail like a missing dmidecode.
pub(crate) struct FakeDmi {
    values: HashMap<String, String>,
}

impl FakeDmi {
    pub fn with(values: &[(&str, &str)]) -> Self {
        Self {
            values: values
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

#[async_trait]
impl DmiReader for FakeDmi {
    async fn read(&self, keyword: &str) -> anyhow::Result<String> {
        self.values
            .get(keyword)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no DMI value for {keyword}"))
    }
}

#[derive(Clone)]
enum ProbeBehaviour {
    Found(String),
    Absent(String),
    Fail(String),
    Panic,
}

#[derive(Clone)]
pub(crate) struct FakeProbe {
    discovery_type: DiscoveryType,
    behaviour: ProbeBehaviour,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl FakeProbe {
    fn with_behaviour(discovery_type: DiscoveryType, behaviour: ProbeBehaviour) -> Self {
        Self {
            discovery_type,
            behaviour,
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn found(discovery_type: DiscoveryType, summary: &str) -> Self {
        Self::with_behaviour(discovery_type, ProbeBehaviour::Found(summary.into()))
    }

    pub fn absent(discovery_type: DiscoveryType, summary: &str) -> Self {
        Self::with_behaviour(discovery_type, ProbeBehaviour::Absent(summary.into()))
    }

    pub fn failing(discovery_type: DiscoveryType, message: &str) -> Self {
        Self::with_behaviour(discovery_type, ProbeBehaviour::Fail(message.into()))
    }

    pub fn panicking(discovery_type: DiscoveryType) -> Self {
        Self::with_behaviour(discovery_type, ProbeBehaviour::Panic)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub(crate) fn sample_payload(discovery_type: DiscoveryType) -> DiscoveryPayload {
    match discovery_type {
        DiscoveryType::Host => DiscoveryPayload::Host(HostDiscovery {
            hostname: "vmhana01".into(),
            os_version: "SUSE Linux Enterprise Server 15 SP5".into(),
            cpu_count: 4,
            ..HostDiscovery::default()
        }),
        DiscoveryType::Cluster => DiscoveryPayload::Cluster(Box::new(ClusterSnapshot {
            cib: Cib::default(),
            crmmon: CrmMon::default(),
            sbd: None,
            id: "C1".into(),
            name: "n1".into(),
        })),
        DiscoveryType::Cloud => DiscoveryPayload::Cloud(CloudInstance::unknown()),
        DiscoveryType::SapSystems => DiscoveryPayload::SapSystems(Vec::new()),
        DiscoveryType::Subscription => DiscoveryPayload::Subscriptions(Vec::new()),
    }
}

#[async_trait]
impl DiscoveryProbe for FakeProbe {
    fn discovery_type(&self) -> DiscoveryType {
        self.discovery_type
    }

    async fn discover(&self) -> anyhow::Result<ProbeOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.behaviour {
            ProbeBehaviour::Found(summary) => Ok(ProbeOutcome::found(
                summary.clone(),
                sample_payload(self.discovery_type),
            )),
            ProbeBehaviour::Absent(summary) => Ok(ProbeOutcome::absent(summary.clone())),
            ProbeBehaviour::Fail(message) => Err(anyhow::anyhow!("{message}")),
            ProbeBehaviour::Panic => panic!("probe blew up"),
        }
    }
}

/// Publisher remembering what it was asked to publish.
#[derive(Clone, Default)]
pub(crate) struct RecordingPublisher {
    published: Arc<StdMutex<Vec<DiscoveryType>>>,
    reject: bool,
}

impl RecordingPublisher {
    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::default()
        }
    }

    pub fn published(&self) -> Vec<DiscoveryType> {
        self.published.lock().expect("published lock").clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(
        &self,
        discovery_type: DiscoveryType,
        _payload: &DiscoveryPayload,
    ) -> Result<(), PublishError> {
        if self.reject {
            return Err(PublishError::Rejected {
                agent_id: test_identity().agent_id,
                discovery_type,
                status: StatusCode::BAD_REQUEST,
                body: r#"{"error":"rejected","code":"invalid_payload"}"#.into(),
            });
        }
        self.published
            .lock()
            .expect("published lock")
            .push(discovery_type);
        Ok(())
    }
}
