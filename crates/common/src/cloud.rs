use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Cloud provider the host runs on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudProvider {
    /// Microsoft Azure.
    Azure,
    /// Amazon Web Services.
    Aws,
    /// Google Cloud Platform.
    Gcp,
    /// Not running on a recognised cloud.
    #[default]
    Unknown,
}

impl CloudProvider {
    /// Returns the lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            CloudProvider::Azure => "azure",
            CloudProvider::Aws => "aws",
            CloudProvider::Gcp => "gcp",
            CloudProvider::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cloud discovery result: the provider and, when known, its metadata.
///
/// Metadata is decoded with the schema belonging to `provider`; an `unknown`
/// provider never carries metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCloudInstance")]
pub struct CloudInstance {
    /// Detected provider.
    pub provider: CloudProvider,
    /// Provider-specific metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<CloudMetadata>,
}

impl CloudInstance {
    /// Instance that is not on any recognised cloud.
    pub fn unknown() -> Self {
        Self::default()
    }
}

#[derive(Deserialize)]
struct RawCloudInstance {
    provider: CloudProvider,
    #[serde(default)]
    metadata: Option<Value>,
}

impl TryFrom<RawCloudInstance> for CloudInstance {
    type Error = String;

    fn try_from(raw: RawCloudInstance) -> Result<Self, Self::Error> {
        let metadata = match (raw.provider, raw.metadata) {
            (_, None) | (_, Some(Value::Null)) => None,
            (CloudProvider::Unknown, Some(_)) => {
                return Err("unknown cloud provider cannot carry metadata".to_string());
            }
            (CloudProvider::Azure, Some(value)) => Some(CloudMetadata::Azure(
                serde_json::from_value(value).map_err(|err| format!("azure metadata: {err}"))?,
            )),
            (CloudProvider::Aws, Some(value)) => Some(CloudMetadata::Aws(
                serde_json::from_value(value).map_err(|err| format!("aws metadata: {err}"))?,
            )),
            (CloudProvider::Gcp, Some(value)) => Some(CloudMetadata::Gcp(
                serde_json::from_value(value).map_err(|err| format!("gcp metadata: {err}"))?,
            )),
        };

        Ok(CloudInstance {
            provider: raw.provider,
            metadata,
        })
    }
}

/// Provider-specific metadata document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CloudMetadata {
    /// Azure instance metadata service document.
    Azure(Box<AzureMetadata>),
    /// AWS instance identity document.
    Aws(AwsMetadata),
    /// GCP recursive instance metadata.
    Gcp(GcpMetadata),
}

/// Azure IMDS `/metadata/instance` document (subset).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AzureMetadata {
    /// Compute section.
    pub compute: AzureCompute,
    /// Network section.
    pub network: AzureNetwork,
}

impl AzureMetadata {
    /// Portal path of the virtual machine.
    pub fn vm_url(&self) -> String {
        format!("resource{}", self.compute.resource_id)
    }

    /// Portal path of the resource group.
    pub fn resource_group_url(&self) -> String {
        format!(
            "resource/subscriptions/{}/resourceGroups/{}/overview",
            self.compute.subscription_id, self.compute.resource_group_name
        )
    }
}

/// Azure compute metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AzureCompute {
    /// Cloud environment (`AzurePublicCloud`, ...).
    pub az_environment: String,
    /// Region.
    pub location: String,
    /// VM name.
    pub name: String,
    /// Marketplace offer.
    pub offer: String,
    /// OS type.
    pub os_type: String,
    /// Image publisher.
    pub publisher: String,
    /// Resource group.
    pub resource_group_name: String,
    /// Full ARM resource id.
    pub resource_id: String,
    /// Image SKU.
    pub sku: String,
    /// Subscription id.
    pub subscription_id: String,
    /// Image version.
    pub version: String,
    /// VM id.
    pub vm_id: String,
    /// VM size.
    pub vm_size: String,
    /// Availability zone.
    pub zone: String,
    /// Raw tag string.
    pub tags: String,
    /// OS profile.
    pub os_profile: AzureOsProfile,
}

/// Azure OS profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AzureOsProfile {
    /// Admin user.
    pub admin_username: String,
    /// Computer name.
    pub computer_name: String,
}

/// Azure network metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AzureNetwork {
    /// Attached interfaces.
    pub interface: Vec<AzureInterface>,
}

/// Azure network interface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AzureInterface {
    /// IPv4 configuration.
    pub ipv4: AzureIpConfig,
    /// IPv6 configuration.
    pub ipv6: AzureIpConfig,
    /// MAC address.
    pub mac_address: String,
}

/// Azure address configuration for one IP family.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AzureIpConfig {
    /// Assigned addresses.
    pub ip_address: Vec<AzureIpAddress>,
    /// Subnets.
    pub subnet: Vec<AzureSubnet>,
}

/// Azure private/public address pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AzureIpAddress {
    /// Private address.
    pub private_ip_address: String,
    /// Public address, empty if none.
    pub public_ip_address: String,
}

/// Azure subnet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AzureSubnet {
    /// Network address.
    pub address: String,
    /// Prefix length.
    pub prefix: String,
}

/// AWS instance identity document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AwsMetadata {
    /// Account id.
    pub account_id: String,
    /// CPU architecture.
    pub architecture: String,
    /// Availability zone.
    pub availability_zone: String,
    /// AMI id.
    pub image_id: String,
    /// Instance id.
    pub instance_id: String,
    /// Instance type.
    pub instance_type: String,
    /// Private address.
    pub private_ip: String,
    /// Region.
    pub region: String,
}

/// GCP `computeMetadata/v1/instance` document (subset).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GcpMetadata {
    /// Numeric instance id.
    pub id: u64,
    /// Instance name.
    pub name: String,
    /// Fully qualified hostname.
    pub hostname: String,
    /// Zone path (`projects/<n>/zones/<zone>`).
    pub zone: String,
    /// Machine type path.
    pub machine_type: String,
    /// Boot image.
    pub image: String,
    /// CPU platform.
    pub cpu_platform: String,
    /// Network interfaces.
    pub network_interfaces: Vec<GcpNetworkInterface>,
    /// Instance labels.
    pub tags: Vec<String>,
    /// Free-form attributes.
    pub attributes: BTreeMap<String, Value>,
}

impl GcpMetadata {
    /// Zone name without its project prefix.
    pub fn zone_name(&self) -> &str {
        last_segment(&self.zone)
    }

    /// Machine type without its project prefix.
    pub fn machine_type_name(&self) -> &str {
        last_segment(&self.machine_type)
    }
}

/// GCP network interface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcpNetworkInterface {
    /// Internal address.
    pub ip: String,
    /// Network path.
    pub network: String,
}

fn last_segment(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
