//! Shared types for the sapwatch workspace.
//!
//! Discovery payloads published by the agent and the wire DTOs exchanged with
//! the collector live here so both sides decode exactly the same shapes.

#![warn(missing_docs)]

/// Collector HTTP DTOs (ingress request/ack, read-model rows).
pub mod api;
/// Cloud provider tags and provider-specific instance metadata.
pub mod cloud;
/// Pacemaker cluster snapshot and the facts derived from it.
pub mod cluster;
/// Discovery type tags and the closed set of payload schemas.
pub mod discovery;
/// Host inventory payload.
pub mod host;
/// SAP systems payload.
pub mod sap;
/// Subscription entitlement payload.
pub mod subscription;

pub use discovery::{DiscoveryPayload, DiscoveryType, PayloadError};
