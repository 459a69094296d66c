use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

use crate::retry::RetryConfig;

/// Health status reported by a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

impl HealthStatus {
    fn severity(self) -> u8 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Unknown => 1,
            HealthStatus::Degraded => 2,
            HealthStatus::Unhealthy => 3,
        }
    }

    /// Pick the more severe of two statuses
    pub fn worst(self, other: HealthStatus) -> HealthStatus {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }
}

/// A single health observation with message and optional details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub details: HashMap<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl HealthReport {
    pub fn new<S: Into<String>>(status: HealthStatus, message: S) -> Self {
        Self {
            status,
            message: message.into(),
            details: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn healthy<S: Into<String>>(message: S) -> Self {
        Self::new(HealthStatus::Healthy, message)
    }

    pub fn degraded<S: Into<String>>(message: S) -> Self {
        Self::new(HealthStatus::Degraded, message)
    }

    pub fn unhealthy<S: Into<String>>(message: S) -> Self {
        Self::new(HealthStatus::Unhealthy, message)
    }

    pub fn unknown<S: Into<String>>(message: S) -> Self {
        Self::new(HealthStatus::Unknown, message)
    }

    /// Attach a structured detail entry
    pub fn with_detail<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<serde_json::Value>,
    {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// Aggregate a set of reports into one status; no reports means `Unknown`
pub fn overall_health<'a, I>(reports: I) -> HealthStatus
where
    I: IntoIterator<Item = &'a HealthReport>,
{
    reports
        .into_iter()
        .map(|report| report.status)
        .reduce(HealthStatus::worst)
        .unwrap_or(HealthStatus::Unknown)
}

/// A named unit of work supervised by the orchestrator.
///
/// Implementations are owned by the caller and shared with the orchestrator
/// as `Arc<dyn Component>`. The orchestrator only ever looks at a component
/// through these methods.
#[async_trait]
pub trait Component: Send + Sync {
    /// Unique, stable identifier used as the graph key
    fn name(&self) -> &str;

    /// Names of components that must be running before this one starts
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Reserved tie-break hint; levels are currently ordered by name
    fn priority(&self) -> i32 {
        0
    }

    /// Called at most once per successful start cycle
    async fn start(&self, token: &CancellationToken) -> anyhow::Result<()>;

    /// Must be safe to call even if `start` never completed
    async fn stop(&self, token: &CancellationToken) -> anyhow::Result<()>;

    /// Must be safe to call at any time after registration
    async fn health(&self, _token: &CancellationToken) -> HealthReport {
        HealthReport::unknown("no health check")
    }

    /// `None` means a single attempt with no retry
    fn retry_config(&self) -> Option<RetryConfig> {
        None
    }
}
