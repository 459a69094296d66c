use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::app::Orchestrator;
use crate::component::{overall_health, HealthReport, HealthStatus};

/// Shortest accepted polling interval
pub const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// Periodically polls [`Orchestrator::health_check`] and logs transitions
pub struct HealthMonitor {
    orchestrator: Arc<Orchestrator>,
    interval: Duration,
    last_status: Arc<Mutex<HashMap<String, HealthStatus>>>,
}

impl HealthMonitor {
    /// A zero `interval` is raised to [`MIN_INTERVAL`].
    pub fn new(orchestrator: Arc<Orchestrator>, interval: Duration) -> Self {
        let interval = if interval < MIN_INTERVAL {
            warn!("Health interval {:?} too short, using {:?}", interval, MIN_INTERVAL);
            MIN_INTERVAL
        } else {
            interval
        };

        Self {
            orchestrator,
            interval,
            last_status: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Status seen for `component` in the last poll
    pub fn component_health(&self, component: &str) -> HealthStatus {
        self.last_status
            .lock()
            .get(component)
            .copied()
            .unwrap_or(HealthStatus::Unknown)
    }

    /// Worst status seen in the last poll
    pub fn system_health(&self) -> HealthStatus {
        let statuses = self.last_status.lock();
        statuses
            .values()
            .copied()
            .reduce(HealthStatus::worst)
            .unwrap_or(HealthStatus::Unknown)
    }

    /// Run a single poll and return the reports
    pub async fn poll(&self, token: &CancellationToken) -> HashMap<String, HealthReport> {
        let reports = self.orchestrator.health_check(token).await;
        record_transitions(&self.last_status, &reports);
        debug!("System health: {:?}", overall_health(reports.values()));
        reports
    }

    /// Poll every interval until `token` is cancelled
    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Health monitor started (interval: {:?})", self.interval);
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        self.poll(&token).await;
                    }
                }
            }
            info!("Health monitor stopped");
        })
    }
}

fn record_transitions(
    last_status: &Mutex<HashMap<String, HealthStatus>>,
    reports: &HashMap<String, HealthReport>,
) {
    let mut statuses = last_status.lock();
    statuses.retain(|name, _| reports.contains_key(name));

    for (name, report) in reports {
        let previous = statuses.insert(name.clone(), report.status);
        if previous == Some(report.status) {
            continue;
        }

        match report.status {
            HealthStatus::Healthy => {
                if previous.is_some() {
                    info!("Component {} recovered to healthy state", name);
                }
            }
            HealthStatus::Degraded => warn!("Component {} is degraded: {}", name, report.message),
            HealthStatus::Unhealthy => error!("Component {} is unhealthy: {}", name, report.message),
            HealthStatus::Unknown => warn!("Component {} health is unknown", name),
        }
    }
}
