use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::component::HealthReport;
use crate::config::SupervisorConfig;

/// Lifecycle phase of the supervisor or of a single component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

/// Snapshot of one registered component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentState {
    pub name: String,
    pub phase: Phase,
    pub dependencies: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub health: HealthReport,
}

impl ComponentState {
    pub fn new(name: &str, dependencies: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            phase: Phase::Stopped,
            dependencies,
            started_at: None,
            stopped_at: None,
            last_error: None,
            health: HealthReport::unknown("not checked"),
        }
    }
}

/// Supervisor shutdown reason
#[derive(Debug, Clone, PartialEq)]
pub enum ShutdownReason {
    Signal(String),
    UserRequest,
}

/// Runtime options of the orchestrator
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// Limit for a single `start` attempt of a component
    pub start_timeout: Option<Duration>,
    /// Limit for a single `stop` attempt of a component
    pub stop_timeout: Option<Duration>,
    pub event_bus_capacity: usize,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            start_timeout: None,
            stop_timeout: None,
            event_bus_capacity: 256,
        }
    }
}

impl From<&SupervisorConfig> for SupervisorOptions {
    fn from(config: &SupervisorConfig) -> Self {
        Self {
            start_timeout: config.start_timeout_ms.map(Duration::from_millis),
            stop_timeout: config.stop_timeout_ms.map(Duration::from_millis),
            event_bus_capacity: config.event_bus_capacity,
        }
    }
}
