use serde::{Deserialize, Serialize};

/// One product entitlement as reported by `SUSEConnect --status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Product identifier (`SLES_SAP`, `sle-ha`, ...).
    pub identifier: String,
    /// Product version.
    pub version: String,
    /// Architecture.
    pub arch: String,
    /// Registration status (`Registered`, `Not Registered`).
    pub status: String,
    /// Subscription status (`ACTIVE`, `EXPIRED`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_status: Option<String>,
    /// Start of the entitlement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<String>,
    /// End of the entitlement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    /// Subscription type (`full`, `evaluation`, ...).
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}
