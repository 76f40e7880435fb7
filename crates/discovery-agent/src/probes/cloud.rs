//! Cloud provider detection: an ordered chain of detectors, each pairing a
//! DMI signature check with a metadata loader for the same provider.

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use common::{
    DiscoveryPayload, DiscoveryType,
    cloud::{CloudInstance, CloudMetadata, CloudProvider},
};
use tracing::{debug, info};

use super::{DiscoveryProbe, ProbeOutcome, command};
use crate::config::CloudConfig;

pub const AZURE_ASSET_TAG: &str = "7783-7084-3265-9085-8269-3286-77";
pub const AZURE_API_VERSION: &str = "2021-02-01";

#[async_trait]
pub trait DmiReader: Send + Sync {
    async fn read(&self, keyword: &str) -> anyhow::Result<String>;
}

/// `dmidecode -s <keyword>`.
pub struct Dmidecode {
    path: String,
    timeout: Duration,
}

impl Dmidecode {
    pub fn new(path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
        }
    }
}

#[async_trait]
impl DmiReader for Dmidecode {
    async fn read(&self, keyword: &str) -> anyhow::Result<String> {
        let out = command::run(&self.path, &["-s", keyword], self.timeout).await?;
        Ok(String::from_utf8_lossy(&out).trim().to_string())
    }
}

#[async_trait]
pub trait Identifier: Send + Sync {
    async fn identify(&self) -> anyhow::Result<Option<CloudProvider>>;
}

#[async_trait]
pub trait MetadataLoader: Send + Sync {
    async fn load(&self, instance: &mut CloudInstance) -> anyhow::Result<()>;
}

#[async_trait]
pub trait Detector: Send + Sync {
    async fn identify(&self) -> anyhow::Result<Option<CloudProvider>>;
    async fn load(&self, instance: &mut CloudInstance) -> anyhow::Result<()>;
}

pub struct MetadataLoadingDetector {
    identifier: Box<dyn Identifier>,
    loader: Box<dyn MetadataLoader>,
}

impl MetadataLoadingDetector {
    pub fn new(identifier: Box<dyn Identifier>, loader: Box<dyn MetadataLoader>) -> Self {
        Self { identifier, loader }
    }
}

#[async_trait]
impl Detector for MetadataLoadingDetector {
    async fn identify(&self) -> anyhow::Result<Option<CloudProvider>> {
        self.identifier.identify().await
    }

    async fn load(&self, instance: &mut CloudInstance) -> anyhow::Result<()> {
        self.loader.load(instance).await
    }
}

#[derive(Clone, Copy, Debug)]
enum DmiMatch {
    Equals(&'static str),
    /// Case-insensitive substring.
    Contains(&'static str),
}

#[derive(Clone, Copy, Debug)]
struct DmiRule {
    keyword: &'static str,
    matcher: DmiMatch,
}

impl DmiRule {
    fn matches(&self, value: &str) -> bool {
        match self.matcher {
            DmiMatch::Equals(expected) => value.trim() == expected,
            DmiMatch::Contains(needle) => value
                .to_ascii_lowercase()
                .contains(&needle.to_ascii_lowercase()),
        }
    }
}

const AZURE_RULES: &[DmiRule] = &[DmiRule {
    keyword: "chassis-asset-tag",
    matcher: DmiMatch::Equals(AZURE_ASSET_TAG),
}];

const AWS_RULES: &[DmiRule] = &[
    DmiRule {
        keyword: "system-manufacturer",
        matcher: DmiMatch::Contains("Amazon EC2"),
    },
    DmiRule {
        keyword: "bios-version",
        matcher: DmiMatch::Contains("amazon"),
    },
];

const GCP_RULES: &[DmiRule] = &[DmiRule {
    keyword: "bios-vendor",
    matcher: DmiMatch::Contains("Google"),
}];

/// Identifies a provider when any of its DMI rules matches.
pub struct DmiIdentifier {
    provider: CloudProvider,
    rules: &'static [DmiRule],
    dmi: Arc<dyn DmiReader>,
}

impl DmiIdentifier {
    pub fn azure(dmi: Arc<dyn DmiReader>) -> Self {
        Self {
            provider: CloudProvider::Azure,
            rules: AZURE_RULES,
            dmi,
        }
    }

    pub fn aws(dmi: Arc<dyn DmiReader>) -> Self {
        Self {
            provider: CloudProvider::Aws,
            rules: AWS_RULES,
            dmi,
        }
    }

    pub fn gcp(dmi: Arc<dyn DmiReader>) -> Self {
        Self {
            provider: CloudProvider::Gcp,
            rules: GCP_RULES,
            dmi,
        }
    }
}

#[async_trait]
impl Identifier for DmiIdentifier {
    /// Fails only when none of the provider's DMI keywords could be read; a
    /// keyword missing on this machine is not an error while another was read.
    async fn identify(&self) -> anyhow::Result<Option<CloudProvider>> {
        let mut last_err = None;
        let mut read_any = false;
        for rule in self.rules {
            match self.dmi.read(rule.keyword).await {
                Ok(value) if rule.matches(&value) => return Ok(Some(self.provider)),
                Ok(_) => read_any = true,
                Err(err) => last_err = Some(err),
            }
        }
        match last_err {
            Some(err) if !read_any => Err(err),
            _ => Ok(None),
        }
    }
}

/// Fetches the provider's metadata document with a single GET.
pub struct HttpMetadataLoader {
    provider: CloudProvider,
    client: reqwest::Client,
    url: String,
    query: &'static [(&'static str, &'static str)],
    headers: &'static [(&'static str, &'static str)],
}

impl HttpMetadataLoader {
    pub fn azure(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            provider: CloudProvider::Azure,
            client,
            url: format!("{}/metadata/instance", base_url.trim_end_matches('/')),
            query: &[("format", "json"), ("api-version", AZURE_API_VERSION)],
            headers: &[("Metadata", "True")],
        }
    }

    pub fn aws(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            provider: CloudProvider::Aws,
            client,
            url: format!(
                "{}/latest/dynamic/instance-identity/document",
                base_url.trim_end_matches('/')
            ),
            query: &[],
            headers: &[],
        }
    }

    pub fn gcp(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            provider: CloudProvider::Gcp,
            client,
            url: format!(
                "{}/computeMetadata/v1/instance/",
                base_url.trim_end_matches('/')
            ),
            query: &[("recursive", "true")],
            headers: &[("Metadata-Flavor", "Google")],
        }
    }
}

#[async_trait]
impl MetadataLoader for HttpMetadataLoader {
    async fn load(&self, instance: &mut CloudInstance) -> anyhow::Result<()> {
        let mut request = self.client.get(&self.url).query(self.query);
        for (name, value) in self.headers {
            request = request.header(*name, *value);
        }

        let res = request
            .send()
            .await
            .with_context(|| format!("{} metadata request failed", self.provider))?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            anyhow::bail!(
                "{} metadata request failed: status {status}, body: {body}",
                self.provider
            );
        }

        let context = || format!("invalid {} metadata document", self.provider);
        let metadata = match self.provider {
            CloudProvider::Azure => {
                CloudMetadata::Azure(Box::new(res.json().await.with_context(context)?))
            }
            CloudProvider::Aws => CloudMetadata::Aws(res.json().await.with_context(context)?),
            CloudProvider::Gcp => CloudMetadata::Gcp(res.json().await.with_context(context)?),
            CloudProvider::Unknown => anyhow::bail!("unknown provider has no metadata"),
        };
        instance.metadata = Some(metadata);
        Ok(())
    }
}

pub struct CloudDetector {
    detectors: Vec<Box<dyn Detector>>,
}

impl CloudDetector {
    pub fn new(detectors: Vec<Box<dyn Detector>>) -> Self {
        Self { detectors }
    }

    /// Azure, AWS then GCP, all sharing one `dmidecode` reader and HTTP client.
    pub fn from_config(cfg: &CloudConfig, command_timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(cfg.metadata_timeout_secs))
            .build()
            .context("failed to build cloud metadata client")?;
        let dmi: Arc<dyn DmiReader> = Arc::new(Dmidecode::new(&cfg.dmidecode_path, command_timeout));

        Ok(Self::new(vec![
            Box::new(MetadataLoadingDetector::new(
                Box::new(DmiIdentifier::azure(dmi.clone())),
                Box::new(HttpMetadataLoader::azure(
                    client.clone(),
                    &cfg.azure_metadata_url,
                )),
            )),
            Box::new(MetadataLoadingDetector::new(
                Box::new(DmiIdentifier::aws(dmi.clone())),
                Box::new(HttpMetadataLoader::aws(client.clone(), &cfg.aws_metadata_url)),
            )),
            Box::new(MetadataLoadingDetector::new(
                Box::new(DmiIdentifier::gcp(dmi)),
                Box::new(HttpMetadataLoader::gcp(client, &cfg.gcp_metadata_url)),
            )),
        ]))
    }

    /// First detector that identifies its provider wins; its loader then runs
    /// exactly once. No match yields the `unknown` provider.
    pub async fn detect(&self) -> anyhow::Result<CloudInstance> {
        for detector in &self.detectors {
            let provider = match detector.identify().await {
                Ok(Some(provider)) => provider,
                Ok(None) => continue,
                Err(err) => {
                    debug!(?err, "cloud identification failed; trying next provider");
                    continue;
                }
            };

            let mut instance = CloudInstance {
                provider,
                metadata: None,
            };
            detector.load(&mut instance).await?;
            info!(%provider, "cloud provider identified");
            return Ok(instance);
        }

        Ok(CloudInstance::unknown())
    }
}

pub struct CloudProbe {
    detector: CloudDetector,
}

impl CloudProbe {
    pub fn new(detector: CloudDetector) -> Self {
        Self { detector }
    }
}

#[async_trait]
impl DiscoveryProbe for CloudProbe {
    fn discovery_type(&self) -> DiscoveryType {
        DiscoveryType::Cloud
    }

    async fn discover(&self) -> anyhow::Result<ProbeOutcome> {
        let instance = self.detector.detect().await?;
        let summary = match instance.provider {
            CloudProvider::Unknown => "No cloud provider discovered on this host".to_string(),
            provider => format!("Cloud provider {provider} discovered"),
        };
        Ok(ProbeOutcome::found(summary, DiscoveryPayload::Cloud(instance)))
    }
}
