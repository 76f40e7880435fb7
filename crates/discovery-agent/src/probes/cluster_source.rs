//! Reads Pacemaker state from the local admin tools.
//!
//! `cibadmin` and `crm_mon` emit XML which is decoded through quick-xml's serde
//! support into private mirror structs and then mapped onto the shared
//! [`common::cluster`] types. SBD state comes from the sysconfig file and the
//! `sbd` binary.

use std::{collections::BTreeMap, path::PathBuf, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use common::cluster::{
    Attribute, Cib, CibClone, CibConfiguration, CibNode, CibResources, CrmConfig, CrmMon,
    CrmMonClone, CrmMonGroup, CrmMonNode, CrmMonResource, CrmMonSummary, Group, NodesSummary,
    Primitive, ResourceNode, ResourcesSummary, Sbd, SbdDevice, SbdNode,
};
use serde::Deserialize;
use tracing::warn;

use super::command;
use crate::config::ClusterConfig;

const SBD_DEVICE_KEY: &str = "SBD_DEVICE";

#[async_trait]
pub trait ClusterSource: Send + Sync {
    async fn cib(&self) -> anyhow::Result<Cib>;
    async fn crm_mon(&self) -> anyhow::Result<CrmMon>;
    async fn corosync_authkey(&self) -> anyhow::Result<Vec<u8>>;
    async fn sbd(&self) -> anyhow::Result<Sbd>;
}

pub struct LocalClusterSource {
    cibadmin_path: String,
    crm_mon_path: String,
    corosync_key_path: PathBuf,
    sbd_path: String,
    sbd_config_path: PathBuf,
    timeout: Duration,
}

impl LocalClusterSource {
    pub fn new(cfg: &ClusterConfig, timeout: Duration) -> Self {
        Self {
            cibadmin_path: cfg.cibadmin_path.clone(),
            crm_mon_path: cfg.crm_mon_path.clone(),
            corosync_key_path: PathBuf::from(&cfg.corosync_key_path),
            sbd_path: cfg.sbd_path.clone(),
            sbd_config_path: PathBuf::from(&cfg.sbd_config_path),
            timeout,
        }
    }

    async fn sbd_device(&self, device: &str) -> SbdDevice {
        let dump = command::run(&self.sbd_path, &["-d", device, "dump"], self.timeout).await;
        let list = command::run(&self.sbd_path, &["-d", device, "list"], self.timeout).await;

        let (status, dump) = match dump {
            Ok(out) => ("healthy", parse_sbd_dump(&String::from_utf8_lossy(&out))),
            Err(err) => {
                warn!(?err, %device, "sbd dump failed");
                ("unhealthy", BTreeMap::new())
            }
        };
        let list = match list {
            Ok(out) => parse_sbd_list(&String::from_utf8_lossy(&out)),
            Err(err) => {
                warn!(?err, %device, "sbd list failed");
                Vec::new()
            }
        };

        SbdDevice {
            device: device.to_string(),
            status: status.to_string(),
            dump,
            list,
        }
    }
}

#[async_trait]
impl ClusterSource for LocalClusterSource {
    async fn cib(&self) -> anyhow::Result<Cib> {
        let out = command::run(&self.cibadmin_path, &["--query", "--local"], self.timeout).await?;
        parse_cib(&String::from_utf8_lossy(&out))
    }

    async fn crm_mon(&self) -> anyhow::Result<CrmMon> {
        let out = command::run(
            &self.crm_mon_path,
            &["--output-as=xml", "--inactive"],
            self.timeout,
        )
        .await?;
        parse_crm_mon(&String::from_utf8_lossy(&out))
    }

    async fn corosync_authkey(&self) -> anyhow::Result<Vec<u8>> {
        tokio::fs::read(&self.corosync_key_path)
            .await
            .with_context(|| {
                format!(
                    "failed to read corosync authkey {}",
                    self.corosync_key_path.display()
                )
            })
    }

    async fn sbd(&self) -> anyhow::Result<Sbd> {
        let raw = tokio::fs::read_to_string(&self.sbd_config_path)
            .await
            .with_context(|| {
                format!(
                    "failed to read SBD configuration {}",
                    self.sbd_config_path.display()
                )
            })?;
        let config = parse_sbd_config(&raw);

        let mut devices = Vec::new();
        for device in sbd_devices(&config) {
            devices.push(self.sbd_device(&device).await);
        }

        Ok(Sbd { config, devices })
    }
}

/// `KEY=value` lines; comments and blank lines skipped, surrounding quotes removed.
pub fn parse_sbd_config(raw: &str) -> BTreeMap<String, String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| {
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                .unwrap_or(value);
            (key.trim().to_string(), value.to_string())
        })
        .collect()
}

fn sbd_devices(config: &BTreeMap<String, String>) -> Vec<String> {
    config
        .get(SBD_DEVICE_KEY)
        .map(|raw| {
            raw.split(';')
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

pub fn parse_sbd_dump(raw: &str) -> BTreeMap<String, String> {
    raw.lines()
        .filter(|line| !line.starts_with("=="))
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

pub fn parse_sbd_list(raw: &str) -> Vec<SbdNode> {
    raw.lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let id = fields.next()?.parse().ok()?;
            let name = fields.next()?.to_string();
            let status = fields.collect::<Vec<_>>().join(" ");
            Some(SbdNode { id, name, status })
        })
        .collect()
}

pub fn parse_cib(xml: &str) -> anyhow::Result<Cib> {
    let root: XmlCib = quick_xml::de::from_str(xml).context("failed to parse cibadmin output")?;
    Ok(root.into())
}

pub fn parse_crm_mon(xml: &str) -> anyhow::Result<CrmMon> {
    let root: XmlCrmMon = quick_xml::de::from_str(xml).context("failed to parse crm_mon output")?;
    Ok(root.into())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlNvPair {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@value")]
    value: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlAttributeSet {
    #[serde(rename = "nvpair")]
    pairs: Vec<XmlNvPair>,
}

fn flatten_sets(sets: Vec<XmlAttributeSet>) -> Vec<Attribute> {
    sets.into_iter()
        .flat_map(|set| set.pairs)
        .map(|pair| Attribute {
            id: pair.id,
            name: pair.name,
            value: pair.value,
        })
        .collect()
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlCib {
    configuration: XmlConfiguration,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlConfiguration {
    crm_config: XmlCrmConfig,
    nodes: XmlNodes,
    resources: XmlResources,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlCrmConfig {
    #[serde(rename = "cluster_property_set")]
    property_sets: Vec<XmlAttributeSet>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlNodes {
    node: Vec<XmlCibNode>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlCibNode {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@uname")]
    uname: String,
    instance_attributes: Vec<XmlAttributeSet>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlResources {
    primitive: Vec<XmlPrimitive>,
    group: Vec<XmlGroup>,
    #[serde(rename = "clone")]
    clones: Vec<XmlClone>,
    master: Vec<XmlClone>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlPrimitive {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@class")]
    class: String,
    #[serde(rename = "@provider")]
    provider: String,
    #[serde(rename = "@type")]
    kind: String,
    instance_attributes: Vec<XmlAttributeSet>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlGroup {
    #[serde(rename = "@id")]
    id: String,
    primitive: Vec<XmlPrimitive>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlClone {
    #[serde(rename = "@id")]
    id: String,
    primitive: XmlPrimitive,
    meta_attributes: Vec<XmlAttributeSet>,
}

impl From<XmlPrimitive> for Primitive {
    fn from(xml: XmlPrimitive) -> Self {
        Primitive {
            id: xml.id,
            class: xml.class,
            provider: xml.provider,
            kind: xml.kind,
            instance_attributes: flatten_sets(xml.instance_attributes),
        }
    }
}

impl From<XmlClone> for CibClone {
    fn from(xml: XmlClone) -> Self {
        CibClone {
            id: xml.id,
            primitive: xml.primitive.into(),
            meta_attributes: flatten_sets(xml.meta_attributes),
        }
    }
}

impl From<XmlCib> for Cib {
    fn from(xml: XmlCib) -> Self {
        let XmlConfiguration {
            crm_config,
            nodes,
            resources,
        } = xml.configuration;

        Cib {
            configuration: CibConfiguration {
                crm_config: CrmConfig {
                    cluster_properties: flatten_sets(crm_config.property_sets),
                },
                nodes: nodes
                    .node
                    .into_iter()
                    .map(|node| CibNode {
                        id: node.id,
                        uname: node.uname,
                        instance_attributes: flatten_sets(node.instance_attributes),
                    })
                    .collect(),
                resources: CibResources {
                    primitives: resources.primitive.into_iter().map(Into::into).collect(),
                    groups: resources
                        .group
                        .into_iter()
                        .map(|group| Group {
                            id: group.id,
                            primitives: group.primitive.into_iter().map(Into::into).collect(),
                        })
                        .collect(),
                    clones: resources.clones.into_iter().map(Into::into).collect(),
                    masters: resources.master.into_iter().map(Into::into).collect(),
                },
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlCrmMon {
    summary: XmlSummary,
    nodes: XmlCrmMonNodes,
    resources: XmlCrmMonResources,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlSummary {
    current_dc: XmlCurrentDc,
    nodes_configured: XmlCount,
    resources_configured: XmlResourcesConfigured,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlCurrentDc {
    #[serde(rename = "@version")]
    version: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlCount {
    #[serde(rename = "@number")]
    number: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlResourcesConfigured {
    #[serde(rename = "@number")]
    number: u32,
    #[serde(rename = "@disabled")]
    disabled: u32,
    #[serde(rename = "@blocked")]
    blocked: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlCrmMonNodes {
    node: Vec<XmlCrmMonNode>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlCrmMonNode {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@online")]
    online: bool,
    #[serde(rename = "@standby")]
    standby: bool,
    #[serde(rename = "@maintenance")]
    maintenance: bool,
    #[serde(rename = "@unclean")]
    unclean: bool,
    #[serde(rename = "@is_dc")]
    is_dc: bool,
    #[serde(rename = "@resources_running")]
    resources_running: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlCrmMonResources {
    resource: Vec<XmlCrmMonResource>,
    #[serde(rename = "clone")]
    clones: Vec<XmlCrmMonClone>,
    group: Vec<XmlCrmMonGroup>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlCrmMonResource {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@resource_agent")]
    agent: String,
    #[serde(rename = "@role")]
    role: String,
    #[serde(rename = "@active")]
    active: bool,
    #[serde(rename = "@orphaned")]
    orphaned: bool,
    #[serde(rename = "@blocked")]
    blocked: bool,
    #[serde(rename = "@managed")]
    managed: bool,
    #[serde(rename = "@failed")]
    failed: bool,
    #[serde(rename = "@failure_ignored")]
    failure_ignored: bool,
    #[serde(rename = "@nodes_running_on")]
    nodes_running_on: u32,
    node: Vec<XmlResourceNode>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlResourceNode {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@cached")]
    cached: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlCrmMonClone {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@multi_state")]
    multi_state: bool,
    #[serde(rename = "@managed")]
    managed: bool,
    #[serde(rename = "@failed")]
    failed: bool,
    resource: Vec<XmlCrmMonResource>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlCrmMonGroup {
    #[serde(rename = "@id")]
    id: String,
    resource: Vec<XmlCrmMonResource>,
}

impl From<XmlCrmMonResource> for CrmMonResource {
    fn from(xml: XmlCrmMonResource) -> Self {
        CrmMonResource {
            id: xml.id,
            agent: xml.agent,
            role: xml.role,
            active: xml.active,
            orphaned: xml.orphaned,
            blocked: xml.blocked,
            managed: xml.managed,
            failed: xml.failed,
            failure_ignored: xml.failure_ignored,
            nodes_running_on: xml.nodes_running_on,
            node: xml.node.into_iter().next().map(|node| ResourceNode {
                name: node.name,
                id: node.id,
                cached: node.cached,
            }),
        }
    }
}

impl From<XmlCrmMon> for CrmMon {
    fn from(xml: XmlCrmMon) -> Self {
        CrmMon {
            version: xml.summary.current_dc.version,
            summary: CrmMonSummary {
                nodes: NodesSummary {
                    number: xml.summary.nodes_configured.number,
                },
                resources: ResourcesSummary {
                    number: xml.summary.resources_configured.number,
                    disabled: xml.summary.resources_configured.disabled,
                    blocked: xml.summary.resources_configured.blocked,
                },
            },
            nodes: xml
                .nodes
                .node
                .into_iter()
                .map(|node| CrmMonNode {
                    name: node.name,
                    id: node.id,
                    online: node.online,
                    standby: node.standby,
                    maintenance: node.maintenance,
                    unclean: node.unclean,
                    dc: node.is_dc,
                    resources_running: node.resources_running,
                })
                .collect(),
            resources: xml.resources.resource.into_iter().map(Into::into).collect(),
            clones: xml
                .resources
                .clones
                .into_iter()
                .map(|clone| CrmMonClone {
                    id: clone.id,
                    multi_state: clone.multi_state,
                    managed: clone.managed,
                    failed: clone.failed,
                    resources: clone.resource.into_iter().map(Into::into).collect(),
                })
                .collect(),
            groups: xml
                .resources
                .group
                .into_iter()
                .map(|group| CrmMonGroup {
                    id: group.id,
                    resources: group.resource.into_iter().map(Into::into).collect(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CIB_XML: &str = r#"<cib crm_feature_set="3.2.0" validate-with="pacemaker-3.2" epoch="42">
  <configuration>
    <crm_config>
      <cluster_property_set id="cib-bootstrap-options">
        <nvpair id="cib-bootstrap-options-stonith-enabled" name="stonith-enabled" value="true"/>
        <nvpair id="cib-bootstrap-options-cluster-name" name="cluster-name" value="hana_cluster"/>
      </cluster_property_set>
    </crm_config>
    <nodes>
      <node id="1084783375" uname="node01"/>
      <node id="1084783376" uname="node02"/>
    </nodes>
    <resources>
      <primitive id="stonith-sbd" class="stonith" type="external/sbd"/>
      <clone id="cln_SAPHanaTopology_PRD_HDB00">
        <meta_attributes id="cln_SAPHanaTopology_PRD_HDB00-meta_attributes">
          <nvpair id="cln_SAPHanaTopology-interleave" name="interleave" value="true"/>
        </meta_attributes>
        <primitive id="rsc_SAPHanaTopology_PRD_HDB00" class="ocf" provider="suse" type="SAPHanaTopology">
          <instance_attributes id="rsc_SAPHanaTopology_PRD_HDB00-instance_attributes">
            <nvpair id="rsc_SAPHanaTopology_PRD_HDB00-instance_attributes-SID" name="SID" value="PRD"/>
            <nvpair id="rsc_SAPHanaTopology_PRD_HDB00-instance_attributes-InstanceNumber" name="InstanceNumber" value="00"/>
          </instance_attributes>
        </primitive>
      </clone>
      <primitive id="rsc_ip_PRD_HDB00" class="ocf" provider="heartbeat" type="IPaddr2"/>
      <master id="msl_SAPHana_PRD_HDB00">
        <primitive id="rsc_SAPHana_PRD_HDB00" class="ocf" provider="suse" type="SAPHana"/>
      </master>
    </resources>
  </configuration>
  <status/>
</cib>"#;

    const CRM_MON_XML: &str = r#"<pacemaker-result api-version="2.2" request="crm_mon --output-as=xml --inactive">
  <summary>
    <stack type="corosync"/>
    <current_dc present="true" version="2.0.4+20200616.2deceaa3a-3.3.1-2.0.4+20200616.2deceaa3a" name="node01" id="1084783375" with_quorum="true"/>
    <nodes_configured number="2"/>
    <resources_configured number="8" disabled="0" blocked="0"/>
  </summary>
  <nodes>
    <node name="node01" id="1084783375" online="true" standby="false" maintenance="false" unclean="false" is_dc="true" resources_running="5" type="member"/>
    <node name="node02" id="1084783376" online="true" standby="false" maintenance="false" unclean="false" is_dc="false" resources_running="3" type="member"/>
  </nodes>
  <resources>
    <resource id="stonith-sbd" resource_agent="stonith:external/sbd" role="Started" active="true" orphaned="false" blocked="false" managed="true" failed="false" failure_ignored="false" nodes_running_on="1">
      <node name="node01" id="1084783375" cached="true"/>
    </resource>
    <clone id="cln_SAPHanaTopology_PRD_HDB00" multi_state="false" unique="false" managed="true" failed="false" failure_ignored="false">
      <resource id="rsc_SAPHanaTopology_PRD_HDB00" resource_agent="ocf::suse:SAPHanaTopology" role="Started" active="true" orphaned="false" blocked="false" managed="true" failed="false" failure_ignored="false" nodes_running_on="1">
        <node name="node01" id="1084783375" cached="true"/>
      </resource>
    </clone>
    <resource id="rsc_ip_PRD_HDB00" resource_agent="ocf::heartbeat:IPaddr2" role="Started" active="true" orphaned="false" blocked="false" managed="true" failed="false" failure_ignored="false" nodes_running_on="1">
      <node name="node01" id="1084783375" cached="true"/>
    </resource>
    <clone id="msl_SAPHana_PRD_HDB00" multi_state="true" unique="false" managed="true" failed="false" failure_ignored="false">
      <resource id="rsc_SAPHana_PRD_HDB00" resource_agent="ocf::suse:SAPHana" role="Master" active="true" orphaned="false" blocked="false" managed="true" failed="false" failure_ignored="false" nodes_running_on="1">
        <node name="node01" id="1084783375" cached="true"/>
      </resource>
    </clone>
  </resources>
  <status code="0" message="OK"/>
</pacemaker-result>"#;

    #[test]
    fn parses_cib_properties_and_resources() {
        let cib = parse_cib(CIB_XML).expect("cib");
        assert_eq!(cib.cluster_name(), "hana_cluster");
        assert_eq!(cib.configuration.nodes.len(), 2);
        assert_eq!(cib.configuration.nodes[1].uname, "node02");

        let resources = &cib.configuration.resources;
        assert_eq!(resources.primitives.len(), 2);
        assert_eq!(resources.primitives[0].kind, "external/sbd");
        assert_eq!(resources.clones.len(), 1);
        assert_eq!(
            resources.clones[0].primitive.instance_attribute("SID"),
            Some("PRD")
        );
        assert_eq!(resources.clones[0].meta_attributes[0].name, "interleave");
        assert_eq!(resources.masters[0].primitive.kind, "SAPHana");
    }

    #[test]
    fn parses_crm_mon_status() {
        let crm_mon = parse_crm_mon(CRM_MON_XML).expect("crm_mon");
        assert!(crm_mon.version.starts_with("2.0.4"));
        assert_eq!(crm_mon.summary.nodes.number, 2);
        assert_eq!(crm_mon.summary.resources.number, 8);
        assert!(crm_mon.nodes[0].dc);
        assert!(!crm_mon.nodes[1].dc);
        assert_eq!(crm_mon.resources.len(), 2);
        assert_eq!(crm_mon.resources[0].agent, "stonith:external/sbd");
        assert_eq!(
            crm_mon.resources[0].node.as_ref().map(|n| n.name.as_str()),
            Some("node01")
        );
        assert_eq!(crm_mon.clones.len(), 2);
        assert!(crm_mon.clones[1].multi_state);
        assert_eq!(crm_mon.clones[1].resources[0].role, "Master");
    }

    #[test]
    fn malformed_xml_is_an_error() {
        let err = parse_cib("<cib><configuration>").expect_err("truncated");
        assert!(err.to_string().contains("cibadmin"));
    }

    #[test]
    fn parses_sbd_sysconfig() {
        let raw = "# comment\nSBD_DEVICE=\"/dev/vdc;/dev/vdd\"\nSBD_PACEMAKER=yes\n\nSBD_WATCHDOG_TIMEOUT='5'\n";
        let config = parse_sbd_config(raw);
        assert_eq!(config["SBD_DEVICE"], "/dev/vdc;/dev/vdd");
        assert_eq!(config["SBD_PACEMAKER"], "yes");
        assert_eq!(config["SBD_WATCHDOG_TIMEOUT"], "5");
        assert_eq!(sbd_devices(&config), vec!["/dev/vdc", "/dev/vdd"]);
    }

    #[test]
    fn parses_sbd_dump_and_list() {
        let dump = "==Dumping header on disk /dev/vdc\nHeader version     : 2.1\nNumber of slots    : 255\nTimeout (msgwait)  : 10\n==Header on disk /dev/vdc is dumped\n";
        let header = parse_sbd_dump(dump);
        assert_eq!(header["Header version"], "2.1");
        assert_eq!(header["Timeout (msgwait)"], "10");
        assert_eq!(header.len(), 3);

        let list = parse_sbd_list("0\tnode01\tclear\n1\tnode02\treset   node01\n");
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].id, 1);
        assert_eq!(list[1].name, "node02");
        assert_eq!(list[1].status, "reset node01");
    }

    #[tokio::test]
    async fn local_source_reads_authkey_and_sbd_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let key_path = dir.path().join("authkey");
        let sbd_path = dir.path().join("sbd");
        std::fs::write(&key_path, b"secret-key").expect("key");
        std::fs::write(&sbd_path, "SBD_PACEMAKER=yes\n").expect("sbd");

        let cfg = ClusterConfig {
            corosync_key_path: key_path.display().to_string(),
            sbd_config_path: sbd_path.display().to_string(),
            ..ClusterConfig::default()
        };
        let source = LocalClusterSource::new(&cfg, Duration::from_secs(5));

        assert_eq!(source.corosync_authkey().await.expect("key"), b"secret-key");
        let sbd = source.sbd().await.expect("sbd");
        assert_eq!(sbd.config["SBD_PACEMAKER"], "yes");
        assert!(sbd.devices.is_empty());
    }

    #[tokio::test]
    async fn missing_cibadmin_is_an_error() {
        let cfg = ClusterConfig {
            cibadmin_path: "/nonexistent/cibadmin".into(),
            ..ClusterConfig::default()
        };
        let source = LocalClusterSource::new(&cfg, Duration::from_secs(5));
        assert!(source.cib().await.is_err());
    }
}
