//! TTL based liveness check fed by the scheduler after every tick.
//!
//! The check starts out as `warning` when the agent registers and flips to
//! `passing` or `critical` once the first tick completes. A check that is not
//! refreshed within its TTL is reported as expired by [`LivenessCheck::is_expired`].

use std::{fmt, sync::Arc, time::Duration};

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::telemetry;

pub const CHECK_ID: &str = "sapwatchAgent";
pub const REGISTERED_OUTPUT: &str = "Agent registered; waiting for the first discovery";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Passing,
    Warning,
    Critical,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Passing => "passing",
            CheckStatus::Warning => "warning",
            CheckStatus::Critical => "critical",
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LivenessCheck {
    pub check_id: String,
    pub status: CheckStatus,
    pub output: String,
    pub ttl_secs: u64,
    pub updated_at: DateTime<Utc>,
}

impl LivenessCheck {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let ttl = chrono::Duration::seconds(self.ttl_secs as i64);
        now - self.updated_at > ttl
    }

    pub fn is_healthy(&self, now: DateTime<Utc>) -> bool {
        self.status != CheckStatus::Critical && !self.is_expired(now)
    }
}

/// Shared handle to the agent's single liveness check.
#[derive(Clone, Debug)]
pub struct LivenessState {
    inner: Arc<RwLock<LivenessCheck>>,
}

impl LivenessState {
    /// Registers the check with `ttl`, starting in the `warning` state.
    pub fn register(ttl: Duration) -> Self {
        let check = LivenessCheck {
            check_id: CHECK_ID.to_string(),
            status: CheckStatus::Warning,
            output: REGISTERED_OUTPUT.to_string(),
            ttl_secs: ttl.as_secs(),
            updated_at: Utc::now(),
        };
        telemetry::record_liveness_status(check.status);
        Self {
            inner: Arc::new(RwLock::new(check)),
        }
    }

    pub async fn update(&self, status: CheckStatus, output: String) {
        let mut guard = self.inner.write().await;
        guard.status = status;
        guard.output = output;
        guard.updated_at = Utc::now();
        telemetry::record_liveness_status(status);
    }

    pub async fn snapshot(&self) -> LivenessCheck {
        self.inner.read().await.clone()
    }
}

/// `GET /health`: the current check as JSON, 503 when critical or expired.
pub async fn health_handler(State(liveness): State<LivenessState>) -> impl IntoResponse {
    let check = liveness.snapshot().await;
    let status = if check.is_healthy(Utc::now()) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(check))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registration_starts_in_warning() {
        let liveness = LivenessState::register(Duration::from_secs(240));
        let check = liveness.snapshot().await;
        assert_eq!(check.check_id, "sapwatchAgent");
        assert_eq!(check.status, CheckStatus::Warning);
        assert_eq!(check.ttl_secs, 240);
        assert!(check.is_healthy(Utc::now()));
    }

    #[tokio::test]
    async fn update_replaces_status_and_output() {
        let liveness = LivenessState::register(Duration::from_secs(240));
        liveness
            .update(CheckStatus::Critical, "boom".to_string())
            .await;

        let check = liveness.snapshot().await;
        assert_eq!(check.status, CheckStatus::Critical);
        assert_eq!(check.output, "boom");
        assert!(!check.is_healthy(Utc::now()));
    }

    #[test]
    fn stale_check_is_expired() {
        let check = LivenessCheck {
            check_id: CHECK_ID.to_string(),
            status: CheckStatus::Passing,
            output: String::new(),
            ttl_secs: 10,
            updated_at: Utc::now() - chrono::Duration::seconds(11),
        };
        assert!(check.is_expired(Utc::now()));
        assert!(!check.is_healthy(Utc::now()));
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(CheckStatus::Passing).expect("serialize"),
            serde_json::json!("passing")
        );
    }
}
