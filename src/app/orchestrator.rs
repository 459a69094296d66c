use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Span};

use super::types::{ComponentState, Phase, SupervisorOptions};
use crate::component::Component;
use crate::error::{LifelineError, Result};
use crate::events::{EventBus, LifecycleEvent};
use crate::graph::DependencyGraph;
use crate::hooks::{Hook, HookPhase, HookRegistry};

/// Bookkeeping guarded by the orchestrator's single lock
pub(super) struct Registry {
    pub(super) phase: Phase,
    pub(super) graph: DependencyGraph,
    pub(super) states: HashMap<String, ComponentState>,
    pub(super) registration_order: Vec<String>,
    /// Components in the order they reached `Running` in the last start
    pub(super) run_order: Vec<String>,
}

impl Registry {
    fn new() -> Self {
        Self {
            phase: Phase::Stopped,
            graph: DependencyGraph::new(),
            states: HashMap::new(),
            registration_order: Vec::new(),
            run_order: Vec::new(),
        }
    }

    pub(super) fn ensure_phase(&self, expected: Phase) -> Result<()> {
        if self.phase != expected {
            return Err(LifelineError::InvalidPhase {
                expected,
                actual: self.phase,
            });
        }
        Ok(())
    }

    pub(super) fn component(&self, name: &str) -> Option<Arc<dyn Component>> {
        self.graph.node(name).map(|node| Arc::clone(node.component()))
    }
}

/// Supervises a set of interdependent components.
///
/// Components are started level by level (every level concurrently),
/// rolled back on a partial failure and stopped in reverse start order.
/// Component calls never run while the internal lock is held.
pub struct Orchestrator {
    pub(super) inner: RwLock<Registry>,
    pub(super) hooks: RwLock<HookRegistry>,
    pub(super) event_bus: EventBus,
    pub(super) options: SupervisorOptions,
    pub(super) span: Span,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Orchestrator {
    pub fn new() -> Self {
        Self::with_options(SupervisorOptions::default())
    }

    pub fn with_options(options: SupervisorOptions) -> Self {
        Self {
            inner: RwLock::new(Registry::new()),
            hooks: RwLock::new(HookRegistry::new()),
            event_bus: EventBus::new(options.event_bus_capacity),
            options,
            span: info_span!("supervisor"),
        }
    }

    /// Log every operation of this orchestrator inside `span`
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Register a component. The supervisor must be stopped.
    pub fn register_component(&self, component: Arc<dyn Component>) -> Result<()> {
        let _entered = self.span.enter();
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        inner.ensure_phase(Phase::Stopped)?;

        let name = component.name().to_string();
        inner.graph.add_node(component)?;
        let dependencies = inner.graph.dependencies(&name)?;

        inner
            .states
            .insert(name.clone(), ComponentState::new(&name, dependencies));
        inner.registration_order.push(name.clone());

        info!("Registered component {}", name);
        Ok(())
    }

    /// Unregister a component. The supervisor must be stopped and no other
    /// component may still depend on it.
    pub fn unregister_component(&self, name: &str) -> Result<()> {
        let _entered = self.span.enter();
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        inner.ensure_phase(Phase::Stopped)?;

        inner.graph.remove_node(name)?;
        inner.states.remove(name);
        inner.registration_order.retain(|n| n != name);
        inner.run_order.retain(|n| n != name);

        info!("Unregistered component {}", name);
        Ok(())
    }

    pub fn add_hook(&self, phase: HookPhase, hook: Arc<dyn Hook>) {
        debug!("Adding {:?} hook {}", phase, hook.name());
        self.hooks.write().add(phase, hook);
    }

    /// Remove a hook previously added with the same `Arc`
    pub fn remove_hook(&self, phase: HookPhase, hook: &Arc<dyn Hook>) -> bool {
        self.hooks.write().remove(phase, hook)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.event_bus.subscribe()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn startup_levels(&self) -> Result<Vec<Vec<String>>> {
        self.inner.read().graph.startup_levels()
    }

    pub fn startup_order(&self) -> Result<Vec<String>> {
        self.inner.read().graph.startup_order()
    }

    pub fn shutdown_order(&self) -> Result<Vec<String>> {
        self.inner.read().graph.shutdown_order()
    }

    pub fn validate_dependencies(&self) -> Result<()> {
        self.inner.read().graph.validate_dependencies()
    }

    pub fn dependencies(&self, name: &str) -> Result<Vec<String>> {
        self.inner.read().graph.dependencies(name)
    }

    pub fn dependents(&self, name: &str) -> Vec<String> {
        self.inner.read().graph.dependents(name)
    }

    /// Registered component names in registration order
    pub fn component_names(&self) -> Vec<String> {
        self.inner.read().registration_order.clone()
    }

    pub(super) fn emit(&self, event: LifecycleEvent) {
        // no subscribers is fine
        let _ = self.event_bus.publish(event);
    }

    /// Run startup hooks in order; the first failure aborts
    pub(super) async fn run_startup_hooks(
        &self,
        token: &CancellationToken,
        event: &LifecycleEvent,
    ) -> Result<()> {
        let hooks = self.hooks.read().hooks(HookPhase::Startup);
        for hook in hooks {
            if let Err(source) = hook.call(token, event).await {
                error!(
                    "Startup hook {} failed on {}: {}",
                    hook.name(),
                    event.description(),
                    source
                );
                return Err(LifelineError::HookFailed {
                    hook: hook.name().to_string(),
                    source,
                });
            }
        }
        Ok(())
    }

    /// Run shutdown hooks in order; failures are only logged
    pub(super) async fn run_shutdown_hooks(&self, token: &CancellationToken, event: &LifecycleEvent) {
        let hooks = self.hooks.read().hooks(HookPhase::Shutdown);
        for hook in hooks {
            if let Err(e) = hook.call(token, event).await {
                warn!(
                    "Shutdown hook {} failed on {}: {}",
                    hook.name(),
                    event.description(),
                    e
                );
            }
        }
    }
}
