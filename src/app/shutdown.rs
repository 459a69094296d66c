use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

use super::invoke::{invoke_once, invoke_with_retry, Transition};
use super::orchestrator::Registry;
use super::{Orchestrator, Phase};
use crate::error::{LifelineError, Result};
use crate::events::{EventKind, LifecycleEvent};

impl Orchestrator {
    /// Stop every registered component, one at a time, in reverse start
    /// order.
    ///
    /// Always attempted regardless of the current phase and always ends in
    /// `Stopped`. Individual failures are recorded on the component and the
    /// last one is returned after every component was tried.
    pub async fn stop(&self, token: &CancellationToken) -> Result<()> {
        let span = self.span.clone();
        self.stop_all(token).instrument(span).await
    }

    async fn stop_all(&self, token: &CancellationToken) -> Result<()> {
        let order = {
            let mut inner = self.inner.write();
            inner.phase = Phase::Stopping;
            shutdown_sequence(&inner)
        };

        let run_id = Uuid::new_v4();
        info!(%run_id, "Beginning graceful shutdown of {} components", order.len());

        let stopping = LifecycleEvent::new(EventKind::SupervisorStopping, None, run_id);
        self.emit(stopping.clone());
        self.run_shutdown_hooks(token, &stopping).await;

        let mut last_error: Option<(String, anyhow::Error)> = None;

        for name in order {
            let Some(component) = self.inner.read().component(&name) else {
                continue;
            };

            info!("Stopping {} component", name);
            let event = LifecycleEvent::new(EventKind::ComponentStopping, Some(name.as_str()), run_id);
            self.emit(event.clone());
            self.run_shutdown_hooks(token, &event).await;
            self.set_component_phase(&name, Phase::Stopping, None);

            let outcome = invoke_with_retry(
                &component,
                Transition::Stop,
                token,
                self.options.stop_timeout,
                &self.event_bus,
                run_id,
            )
            .await;
            match outcome {
                Ok(()) => {
                    self.set_component_phase(&name, Phase::Stopped, None);
                    self.emit(LifecycleEvent::new(
                        EventKind::ComponentStopped,
                        Some(name.as_str()),
                        run_id,
                    ));
                    info!("{} component stopped", name);
                }
                Err(e) => {
                    error!("Error stopping {} component: {}", name, e);
                    self.set_component_phase(&name, Phase::Failed, Some(e.to_string()));
                    self.emit(
                        LifecycleEvent::new(EventKind::ComponentFailed, Some(name.as_str()), run_id)
                            .with_data(serde_json::json!({ "error": e.to_string() })),
                    );
                    last_error = Some((name, e));
                }
            }
        }

        {
            let mut inner = self.inner.write();
            inner.run_order.clear();
            inner.phase = Phase::Stopped;
        }
        self.emit(LifecycleEvent::new(EventKind::SupervisorStopped, None, run_id));

        match last_error {
            Some((component, source)) => {
                warn!("Shutdown completed with errors");
                Err(LifelineError::ShutdownPartialFailure { component, source })
            }
            None => {
                info!("Graceful shutdown completed");
                Ok(())
            }
        }
    }

    /// Stop, newest first, the components a failed start brought up.
    /// Each gets exactly one `stop` call; errors are only logged.
    pub(super) async fn rollback(&self, token: &CancellationToken, run_id: Uuid, started: &[String]) {
        if started.is_empty() {
            return;
        }

        warn!("Rolling back {} started components", started.len());
        self.emit(
            LifecycleEvent::new(EventKind::RollbackStarted, None, run_id)
                .with_data(serde_json::json!({ "components": started })),
        );

        for name in started.iter().rev() {
            let Some(component) = self.inner.read().component(name) else {
                continue;
            };

            self.set_component_phase(name, Phase::Stopping, None);
            match invoke_once(&component, Transition::Stop, token, self.options.stop_timeout).await {
                Ok(()) => {
                    self.set_component_phase(name, Phase::Stopped, None);
                    self.emit(LifecycleEvent::new(
                        EventKind::ComponentStopped,
                        Some(name.as_str()),
                        run_id,
                    ));
                }
                Err(e) => {
                    error!("Rollback of {} failed: {}", name, e);
                    self.set_component_phase(name, Phase::Failed, Some(e.to_string()));
                }
            }
        }
    }
}

/// Reverse of the last actual start order, then everything else in graph
/// shutdown order, falling back to reverse registration order when the graph
/// cannot be ordered.
pub(super) fn shutdown_sequence(inner: &Registry) -> Vec<String> {
    let mut order: Vec<String> = inner
        .run_order
        .iter()
        .rev()
        .filter(|name| inner.graph.contains(name))
        .cloned()
        .collect();

    let remaining = match inner.graph.shutdown_order() {
        Ok(remaining) => remaining,
        Err(e) => {
            warn!(
                "Cannot compute shutdown order ({}), using reverse registration order",
                e
            );
            inner.registration_order.iter().rev().cloned().collect()
        }
    };

    for name in remaining {
        if !order.contains(&name) {
            order.push(name);
        }
    }
    order
}
