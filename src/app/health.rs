use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn, Instrument};

use super::invoke::panic_message;
use super::Orchestrator;
use crate::component::{overall_health, Component, HealthReport, HealthStatus};

impl Orchestrator {
    /// Ask every registered component for its health, record the results
    /// and return them. Nothing is cached between calls.
    pub async fn health_check(&self, token: &CancellationToken) -> HashMap<String, HealthReport> {
        let span = self.span.clone();
        self.collect_health(token).instrument(span).await
    }

    /// Worst status across all components
    pub async fn overall_health(&self, token: &CancellationToken) -> HealthStatus {
        let reports = self.health_check(token).await;
        overall_health(reports.values())
    }

    async fn collect_health(&self, token: &CancellationToken) -> HashMap<String, HealthReport> {
        let components: Vec<(String, Arc<dyn Component>)> = {
            let inner = self.inner.read();
            inner
                .registration_order
                .iter()
                .filter_map(|name| inner.component(name).map(|c| (name.clone(), c)))
                .collect()
        };

        let mut reports = HashMap::with_capacity(components.len());
        for (name, component) in components {
            let report = match AssertUnwindSafe(component.health(token)).catch_unwind().await {
                Ok(report) => report,
                Err(panic) => {
                    let message = panic_message(panic);
                    warn!("Health check of {} panicked: {}", name, message);
                    HealthReport::unhealthy(format!("health check panicked: {}", message))
                }
            };
            debug!("Component {}: {:?} ({})", name, report.status, report.message);
            reports.insert(name, report);
        }

        let mut inner = self.inner.write();
        for (name, report) in &reports {
            if let Some(state) = inner.states.get_mut(name) {
                state.health = report.clone();
            }
        }

        reports
    }
}
