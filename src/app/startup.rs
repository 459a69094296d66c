use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::task::{self, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Instrument};
use uuid::Uuid;

use super::invoke::{invoke_with_retry, panic_message, Transition};
use super::{Orchestrator, Phase};
use crate::component::Component;
use crate::error::{LifelineError, Result};
use crate::events::{EventKind, LifecycleEvent};

/// Outcome of a failed level: who made it to `Running` before the error
struct LevelFailure {
    started: Vec<String>,
    error: LifelineError,
}

/// Start tasks of one level, each remembered by its task id so a task that
/// was torn down can still be reported under its component's name.
struct LevelTasks {
    set: JoinSet<anyhow::Result<()>>,
    names: HashMap<task::Id, String>,
}

impl LevelTasks {
    fn new() -> Self {
        Self {
            set: JoinSet::new(),
            names: HashMap::new(),
        }
    }

    fn spawn<F>(&mut self, name: String, fut: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handle = self.set.spawn(fut.in_current_span());
        self.names.insert(handle.id(), name);
    }

    /// Next finished task in completion order
    async fn join_next(&mut self) -> Option<(String, anyhow::Result<()>)> {
        let joined = self.set.join_next_with_id().await?;
        Some(match joined {
            Ok((id, result)) => (self.names.remove(&id).unwrap_or_default(), result),
            Err(join_error) => {
                let name = self.names.remove(&join_error.id()).unwrap_or_default();
                error!("Start task of {} aborted: {}", name, join_error);
                let e = if join_error.is_panic() {
                    let message = panic_message(join_error.into_panic());
                    anyhow::Error::new(LifelineError::panic(name.clone(), message))
                } else {
                    anyhow::anyhow!(join_error.to_string())
                };
                (name, Err(e))
            }
        })
    }
}

impl Orchestrator {
    /// Start every registered component in dependency order.
    ///
    /// Either all components end up running, or everything this call
    /// started is stopped again and the supervisor is back to `Stopped`.
    pub async fn start(&self, token: &CancellationToken) -> Result<()> {
        let span = self.span.clone();
        self.start_all(token).instrument(span).await
    }

    async fn start_all(&self, token: &CancellationToken) -> Result<()> {
        {
            let mut inner = self.inner.write();
            inner.ensure_phase(Phase::Stopped)?;
            inner.phase = Phase::Starting;
            inner.run_order.clear();
        }

        let run_id = Uuid::new_v4();
        info!(%run_id, "Starting supervisor");

        let starting = LifecycleEvent::new(EventKind::SupervisorStarting, None, run_id);
        self.emit(starting.clone());
        if let Err(e) = self.run_startup_hooks(token, &starting).await {
            self.abort_start(run_id);
            return Err(e);
        }

        let levels = match self.startup_levels() {
            Ok(levels) => levels,
            Err(e) => {
                error!("Cannot compute startup order: {}", e);
                self.abort_start(run_id);
                return Err(e);
            }
        };

        let mut started: Vec<String> = Vec::new();
        for (level, names) in levels.iter().enumerate() {
            info!("Starting level {}: {:?}", level, names);

            let outcome = match self.start_level(token, run_id, level, names).await {
                Ok(order) => {
                    started.extend(order.iter().cloned());
                    self.after_level_hooks(token, run_id, level, &order).await
                }
                Err(failure) => {
                    started.extend(failure.started);
                    Err(failure.error)
                }
            };

            if let Err(e) = outcome {
                error!("Startup failed: {}", e);
                self.rollback(token, run_id, &started).await;
                self.abort_start(run_id);
                return Err(e);
            }
        }

        {
            let mut inner = self.inner.write();
            inner.run_order = started;
            inner.phase = Phase::Running;
        }
        self.emit(LifecycleEvent::new(EventKind::SupervisorRunning, None, run_id));
        info!("Supervisor started successfully");
        Ok(())
    }

    /// Back to `Stopped` after a start that did not get everything running
    fn abort_start(&self, run_id: Uuid) {
        self.set_phase(Phase::Stopped);
        self.emit(LifecycleEvent::new(EventKind::SupervisorStopped, None, run_id));
    }

    /// Start every component of one level concurrently and wait for all of
    /// them. Returns the names in the order they reached `Running`.
    async fn start_level(
        &self,
        token: &CancellationToken,
        run_id: Uuid,
        level: usize,
        names: &[String],
    ) -> std::result::Result<Vec<String>, LevelFailure> {
        let components: Vec<(String, Arc<dyn Component>)> = {
            let inner = self.inner.read();
            names
                .iter()
                .filter_map(|name| inner.component(name).map(|c| (name.clone(), c)))
                .collect()
        };

        let mut tasks = LevelTasks::new();
        for (name, component) in components {
            self.set_component_phase(&name, Phase::Starting, None);
            self.emit(LifecycleEvent::new(EventKind::ComponentStarting, Some(name.as_str()), run_id));

            let token = token.clone();
            let timeout = self.options.start_timeout;
            let events = self.event_bus.clone();
            tasks.spawn(name, async move {
                invoke_with_retry(&component, Transition::Start, &token, timeout, &events, run_id).await
            });
        }

        let mut succeeded: Vec<String> = Vec::new();
        let mut failures: Vec<(String, anyhow::Error)> = Vec::new();

        while let Some((name, result)) = tasks.join_next().await {
            match result {
                Ok(()) => {
                    info!("Component {} is running", name);
                    self.set_component_phase(&name, Phase::Running, None);
                    self.emit(
                        LifecycleEvent::new(EventKind::ComponentRunning, Some(name.as_str()), run_id)
                            .with_data(serde_json::json!({ "level": level })),
                    );
                    succeeded.push(name);
                }
                Err(e) => {
                    error!("Component {} failed to start: {}", name, e);
                    self.set_component_phase(&name, Phase::Failed, Some(e.to_string()));
                    self.emit(
                        LifecycleEvent::new(EventKind::ComponentFailed, Some(name.as_str()), run_id)
                            .with_data(serde_json::json!({ "level": level, "error": e.to_string() })),
                    );
                    failures.push((name, e));
                }
            }
        }

        if failures.is_empty() {
            return Ok(succeeded);
        }

        let mut failed: Vec<String> = failures.iter().map(|(name, _)| name.clone()).collect();
        failed.sort();
        let (component, source) = failures.swap_remove(0);

        Err(LevelFailure {
            started: succeeded,
            error: LifelineError::StartupFailed {
                component,
                level,
                failed,
                source,
            },
        })
    }

    /// Fire per-component startup hooks for a level that came up
    async fn after_level_hooks(
        &self,
        token: &CancellationToken,
        run_id: Uuid,
        level: usize,
        order: &[String],
    ) -> Result<()> {
        for name in order {
            let event = LifecycleEvent::new(EventKind::ComponentRunning, Some(name.as_str()), run_id)
                .with_data(serde_json::json!({ "level": level }));

            if let Err(e) = self.run_startup_hooks(token, &event).await {
                return Err(LifelineError::StartupFailed {
                    component: name.clone(),
                    level,
                    failed: vec![name.clone()],
                    source: e.into(),
                });
            }
        }
        Ok(())
    }
}
