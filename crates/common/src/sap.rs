use serde::{Deserialize, Serialize};

/// Role of an SAP system or instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SapSystemType {
    /// HANA database.
    Database,
    /// ABAP/Java application server.
    Application,
    /// Not recognised.
    #[default]
    Unknown,
}

impl SapSystemType {
    /// Returns the lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SapSystemType::Database => "database",
            SapSystemType::Application => "application",
            SapSystemType::Unknown => "unknown",
        }
    }
}

/// One SAP system identified by its SID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SapSystem {
    /// Three character system id.
    pub sid: String,
    /// System role derived from its instances.
    pub system_type: SapSystemType,
    /// Instances installed for this SID.
    #[serde(default)]
    pub instances: Vec<SapInstance>,
}

/// One SAP instance directory (`HDB00`, `ASCS01`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SapInstance {
    /// Directory name.
    pub name: String,
    /// Two digit instance number.
    pub number: String,
    /// Instance role.
    pub kind: SapSystemType,
}

/// Comma separated SIDs, in input order.
pub fn joined_sids(systems: &[SapSystem]) -> String {
    systems
        .iter()
        .map(|system| system.sid.as_str())
        .collect::<Vec<_>>()
        .join(",")
}
