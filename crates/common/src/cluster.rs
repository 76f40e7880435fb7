use serde::{Deserialize, Serialize};

/// CIB property holding the cluster name.
pub const CLUSTER_NAME_PROPERTY: &str = "cib-bootstrap-options-cluster-name";
/// CIB property holding the fencing switch.
pub const STONITH_ENABLED_PROPERTY: &str = "cib-bootstrap-options-stonith-enabled";
/// Fencing type reported when no fencing resource is configured.
pub const FENCING_NOT_CONFIGURED: &str = "notconfigured";
/// Fencing type of SBD based fencing.
pub const FENCING_SBD: &str = "external/sbd";

const STONITH_AGENT_PREFIX: &str = "stonith:";

/// Full snapshot of a Pacemaker cluster as seen from one member node.
///
/// Decoding is strict at this level: a document carrying foreign top-level
/// keys is not a cluster snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterSnapshot {
    /// Static configuration (CIB).
    pub cib: Cib,
    /// Runtime status (crm_mon).
    pub crmmon: CrmMon,
    /// SBD fencing configuration, when SBD is in use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sbd: Option<Sbd>,
    /// Stable cluster identifier derived from the corosync authkey.
    pub id: String,
    /// Cluster name taken from the CIB, empty if unset.
    #[serde(default)]
    pub name: String,
}

impl ClusterSnapshot {
    /// Type of the first stonith resource, or [`FENCING_NOT_CONFIGURED`].
    pub fn fencing_type(&self) -> String {
        self.crmmon
            .resources
            .iter()
            .find_map(|resource| resource.agent.strip_prefix(STONITH_AGENT_PREFIX))
            .map(str::to_string)
            .unwrap_or_else(|| FENCING_NOT_CONFIGURED.to_string())
    }

    /// Whether the `stonith-enabled` property is set to a true value.
    pub fn is_fencing_enabled(&self) -> bool {
        self.cib
            .property(STONITH_ENABLED_PROPERTY)
            .and_then(parse_bool)
            .unwrap_or(false)
    }

    /// Whether `hostname` is the current designated controller.
    pub fn is_dc(&self, hostname: &str) -> bool {
        self.crmmon
            .nodes
            .iter()
            .any(|node| node.name == hostname && node.dc)
    }

    /// Whether any stonith resource is configured.
    pub fn fencing_resource_exists(&self) -> bool {
        self.fencing_type() != FENCING_NOT_CONFIGURED
    }

    /// Whether fencing is done through SBD.
    pub fn is_fencing_sbd(&self) -> bool {
        self.fencing_type() == FENCING_SBD
    }
}

/// Pacemaker-style boolean parsing (`true`, `yes`, `on`, `1`, ...).
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "y" | "yes" | "on" => Some(true),
        "0" | "f" | "false" | "n" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Cluster information base as produced by `cibadmin --query`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Cib {
    /// `<configuration>` section.
    pub configuration: CibConfiguration,
}

impl Cib {
    /// Looks up a cluster property by its id.
    pub fn property(&self, id: &str) -> Option<&str> {
        self.configuration
            .crm_config
            .cluster_properties
            .iter()
            .find(|property| property.id == id)
            .map(|property| property.value.as_str())
    }

    /// Cluster name property, empty when unset.
    pub fn cluster_name(&self) -> String {
        self.property(CLUSTER_NAME_PROPERTY)
            .unwrap_or_default()
            .to_string()
    }
}

/// `<configuration>` of the CIB.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CibConfiguration {
    /// `<crm_config>` property sets, flattened.
    pub crm_config: CrmConfig,
    /// Configured nodes.
    pub nodes: Vec<CibNode>,
    /// Configured resources.
    pub resources: CibResources,
}

/// Cluster-wide properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrmConfig {
    /// Name/value pairs from every `cluster_property_set`.
    pub cluster_properties: Vec<Attribute>,
}

/// A CIB `nvpair`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Attribute {
    /// Element id.
    pub id: String,
    /// Attribute name.
    pub name: String,
    /// Attribute value.
    pub value: String,
}

/// A configured cluster node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CibNode {
    /// Node id.
    pub id: String,
    /// Node name.
    pub uname: String,
    /// Node instance attributes.
    pub instance_attributes: Vec<Attribute>,
}

/// `<resources>` of the CIB.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CibResources {
    /// Top-level primitives.
    pub primitives: Vec<Primitive>,
    /// Resource groups.
    pub groups: Vec<Group>,
    /// Clone sets.
    pub clones: Vec<CibClone>,
    /// Promotable (master/slave) sets.
    pub masters: Vec<CibClone>,
}

/// A primitive resource definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Primitive {
    /// Resource id.
    pub id: String,
    /// Agent class (`ocf`, `stonith`, `systemd`, ...).
    pub class: String,
    /// Agent provider (`heartbeat`, `suse`, ...).
    pub provider: String,
    /// Agent type (`SAPHana`, `IPaddr2`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// Instance attributes.
    pub instance_attributes: Vec<Attribute>,
}

impl Primitive {
    /// Value of the named instance attribute.
    pub fn instance_attribute(&self, name: &str) -> Option<&str> {
        self.instance_attributes
            .iter()
            .find(|attribute| attribute.name == name)
            .map(|attribute| attribute.value.as_str())
    }
}

/// A resource group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Group {
    /// Group id.
    pub id: String,
    /// Group members.
    pub primitives: Vec<Primitive>,
}

/// A clone or promotable clone set wrapping a single primitive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CibClone {
    /// Clone id.
    pub id: String,
    /// Cloned primitive.
    pub primitive: Primitive,
    /// Meta attributes.
    pub meta_attributes: Vec<Attribute>,
}

/// Runtime status as reported by `crm_mon --output-as=xml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrmMon {
    /// Pacemaker version.
    pub version: String,
    /// Counters.
    pub summary: CrmMonSummary,
    /// Node status.
    pub nodes: Vec<CrmMonNode>,
    /// Ungrouped resources.
    pub resources: Vec<CrmMonResource>,
    /// Clone sets with their member resources.
    pub clones: Vec<CrmMonClone>,
    /// Groups with their member resources.
    pub groups: Vec<CrmMonGroup>,
}

/// crm_mon summary counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrmMonSummary {
    /// Configured node count.
    pub nodes: NodesSummary,
    /// Configured resource counters.
    pub resources: ResourcesSummary,
}

/// Node counter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodesSummary {
    /// Number of configured nodes.
    pub number: u32,
}

/// Resource counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourcesSummary {
    /// Number of configured resources.
    pub number: u32,
    /// Disabled resources.
    pub disabled: u32,
    /// Blocked resources.
    pub blocked: u32,
}

/// Status of one node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrmMonNode {
    /// Node name.
    pub name: String,
    /// Node id.
    pub id: String,
    /// Node is online.
    pub online: bool,
    /// Node is in standby.
    pub standby: bool,
    /// Node is in maintenance.
    pub maintenance: bool,
    /// Node is unclean.
    pub unclean: bool,
    /// Node is the designated controller.
    pub dc: bool,
    /// Number of resources running on the node.
    pub resources_running: u32,
}

/// Status of one resource instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrmMonResource {
    /// Resource id.
    pub id: String,
    /// Full agent string (`ocf::suse:SAPHana`, `stonith:external/sbd`).
    pub agent: String,
    /// Current role (`Started`, `Master`, `Slave`, ...).
    pub role: String,
    /// Resource is active.
    pub active: bool,
    /// Resource is orphaned.
    pub orphaned: bool,
    /// Resource is blocked.
    pub blocked: bool,
    /// Resource is managed.
    pub managed: bool,
    /// Resource failed.
    pub failed: bool,
    /// Failure is ignored.
    pub failure_ignored: bool,
    /// Number of nodes the resource runs on.
    pub nodes_running_on: u32,
    /// Node the resource runs on, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<ResourceNode>,
}

/// Node reference attached to a running resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceNode {
    /// Node name.
    pub name: String,
    /// Node id.
    pub id: String,
    /// Whether the node is cached.
    pub cached: bool,
}

/// Clone set status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrmMonClone {
    /// Clone id.
    pub id: String,
    /// Promotable clone.
    pub multi_state: bool,
    /// Clone is managed.
    pub managed: bool,
    /// Some instance failed.
    pub failed: bool,
    /// Clone instances.
    pub resources: Vec<CrmMonResource>,
}

/// Group status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrmMonGroup {
    /// Group id.
    pub id: String,
    /// Group members.
    pub resources: Vec<CrmMonResource>,
}

/// SBD fencing configuration and device state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sbd {
    /// Raw key/value pairs from the SBD sysconfig file.
    pub config: std::collections::BTreeMap<String, String>,
    /// Configured SBD devices.
    pub devices: Vec<SbdDevice>,
}

/// One SBD device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SbdDevice {
    /// Device path.
    pub device: String,
    /// `healthy` when the header dump succeeded, `unhealthy` otherwise.
    pub status: String,
    /// Header fields from `sbd dump`.
    pub dump: std::collections::BTreeMap<String, String>,
    /// Slot list from `sbd list`.
    pub list: Vec<SbdNode>,
}

/// A slot in an SBD device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SbdNode {
    /// Slot id.
    pub id: u32,
    /// Node name.
    pub name: String,
    /// Slot message (`clear`, `reset`, ...).
    pub status: String,
}
