use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use common::{
    DiscoveryPayload, DiscoveryType,
    sap::{SapInstance, SapSystem, SapSystemType, joined_sids},
};

use super::{DiscoveryProbe, ProbeOutcome};

const DATABASE_INSTANCES: &[&str] = &["HDB"];
const APPLICATION_INSTANCES: &[&str] = &["ASCS", "ERS", "D", "DVEBMGS", "J", "SCS", "W", "G"];
const DIAGNOSTICS_INSTANCES: &[&str] = &["SMDA"];

pub struct SapSystemsProbe {
    install_root: PathBuf,
}

impl SapSystemsProbe {
    pub fn new(install_root: impl Into<PathBuf>) -> Self {
        Self {
            install_root: install_root.into(),
        }
    }
}

#[async_trait]
impl DiscoveryProbe for SapSystemsProbe {
    fn discovery_type(&self) -> DiscoveryType {
        DiscoveryType::SapSystems
    }

    async fn discover(&self) -> anyhow::Result<ProbeOutcome> {
        let systems = scan_install_root(&self.install_root).await?;
        let summary = if systems.is_empty() {
            "No SAP system discovered on this host".to_string()
        } else {
            format!("SAP system(s) with ID: {} discovered", joined_sids(&systems))
        };
        Ok(ProbeOutcome::found(
            summary,
            DiscoveryPayload::SapSystems(systems),
        ))
    }
}

/// Walks `<root>/<SID>/<instance>`; a missing root means no systems.
pub async fn scan_install_root(root: &Path) -> anyhow::Result<Vec<SapSystem>> {
    if !tokio::fs::try_exists(root).await.unwrap_or(false) {
        return Ok(Vec::new());
    }

    let mut systems = Vec::new();
    for sid in list_dirs(root).await? {
        if !is_sid(&sid) {
            continue;
        }

        let mut instances: Vec<SapInstance> = list_dirs(&root.join(&sid))
            .await?
            .iter()
            .filter_map(|name| parse_instance(name))
            .collect();
        if instances.is_empty() {
            continue;
        }
        instances.sort_by(|a, b| a.name.cmp(&b.name));

        systems.push(SapSystem {
            system_type: system_type(&instances),
            sid,
            instances,
        });
    }

    systems.sort_by(|a, b| a.sid.cmp(&b.sid));
    Ok(systems)
}

async fn list_dirs(path: &Path) -> anyhow::Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(path)
        .await
        .with_context(|| format!("failed to list {}", path.display()))?;
    let mut names = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("failed to list {}", path.display()))?
    {
        if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(names)
}

fn is_sid(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() == 3
        && bytes[0].is_ascii_uppercase()
        && bytes[1..]
            .iter()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

/// `HDB00` → (`HDB`, `00`); diagnostics agents and unrelated directories are skipped.
fn parse_instance(name: &str) -> Option<SapInstance> {
    if name.len() < 3 || !name.is_ascii() {
        return None;
    }
    let (prefix, number) = name.split_at(name.len() - 2);
    if prefix.is_empty()
        || !prefix.bytes().all(|b| b.is_ascii_uppercase())
        || !number.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    if DIAGNOSTICS_INSTANCES.contains(&prefix) {
        return None;
    }

    let kind = if DATABASE_INSTANCES.contains(&prefix) {
        SapSystemType::Database
    } else if APPLICATION_INSTANCES.contains(&prefix) {
        SapSystemType::Application
    } else {
        SapSystemType::Unknown
    };

    Some(SapInstance {
        name: name.to_string(),
        number: number.to_string(),
        kind,
    })
}

fn system_type(instances: &[SapInstance]) -> SapSystemType {
    if instances.iter().any(|i| i.kind == SapSystemType::Database) {
        SapSystemType::Database
    } else if instances.iter().any(|i| i.kind == SapSystemType::Application) {
        SapSystemType::Application
    } else {
        SapSystemType::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mkdirs(root: &Path, paths: &[&str]) {
        for path in paths {
            std::fs::create_dir_all(root.join(path)).expect("mkdir");
        }
    }

    #[test]
    fn instance_names_are_classified() {
        let hdb = parse_instance("HDB00").expect("hdb");
        assert_eq!(hdb.number, "00");
        assert_eq!(hdb.kind, SapSystemType::Database);
        assert_eq!(
            parse_instance("ASCS01").expect("ascs").kind,
            SapSystemType::Application
        );
        assert_eq!(parse_instance("D02").expect("d").kind, SapSystemType::Application);
        assert_eq!(parse_instance("XYZ07").expect("xyz").kind, SapSystemType::Unknown);
        assert!(parse_instance("SMDA97").is_none());
        assert!(parse_instance("SYS").is_none());
        assert!(parse_instance("hdb00").is_none());
    }

    #[test]
    fn sid_pattern() {
        assert!(is_sid("PRD"));
        assert!(is_sid("H2O"));
        assert!(!is_sid("2AB"));
        assert!(!is_sid("trans"));
        assert!(!is_sid("Prd"));
    }

    #[tokio::test]
    async fn scans_systems_from_directory_tree() {
        let dir = tempfile::tempdir().expect("tempdir");
        mkdirs(
            dir.path(),
            &[
                "PRD/HDB00",
                "PRD/SYS",
                "NWP/ASCS01",
                "NWP/ERS10",
                "DAA/SMDA97",
                "hostctrl/exe",
                "trans",
            ],
        );

        let systems = scan_install_root(dir.path()).await.expect("scan");
        let sids: Vec<_> = systems.iter().map(|s| s.sid.as_str()).collect();
        assert_eq!(sids, vec!["NWP", "PRD"]);
        assert_eq!(systems[0].system_type, SapSystemType::Application);
        assert_eq!(systems[0].instances.len(), 2);
        assert_eq!(systems[1].system_type, SapSystemType::Database);
    }

    #[tokio::test]
    async fn missing_root_reports_no_systems() {
        let probe = SapSystemsProbe::new("/nonexistent/usr/sap");
        let outcome = probe.discover().await.expect("probe");
        assert_eq!(outcome.summary, "No SAP system discovered on this host");
        assert_eq!(outcome.payload, Some(DiscoveryPayload::SapSystems(Vec::new())));
    }

    #[tokio::test]
    async fn summary_lists_sids() {
        let dir = tempfile::tempdir().expect("tempdir");
        mkdirs(dir.path(), &["PRD/HDB00", "QAS/HDB10"]);

        let outcome = SapSystemsProbe::new(dir.path())
            .discover()
            .await
            .expect("probe");
        assert_eq!(outcome.summary, "SAP system(s) with ID: PRD,QAS discovered");
    }
}
