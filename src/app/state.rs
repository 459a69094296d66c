use chrono::Utc;
use std::collections::HashMap;
use tracing::debug;

use super::{ComponentState, Orchestrator, Phase};

impl Orchestrator {
    /// Current supervisor phase
    pub fn phase(&self) -> Phase {
        self.inner.read().phase
    }

    pub(super) fn set_phase(&self, phase: Phase) {
        self.inner.write().phase = phase;
        debug!("Supervisor phase changed to: {:?}", phase);
    }

    /// Update a component phase, stamping start/stop times and errors
    pub(super) fn set_component_phase(&self, component: &str, phase: Phase, error: Option<String>) {
        let mut inner = self.inner.write();
        if let Some(state) = inner.states.get_mut(component) {
            state.phase = phase;
            match phase {
                Phase::Running => {
                    state.started_at = Some(Utc::now());
                    state.last_error = None;
                }
                Phase::Stopped => state.stopped_at = Some(Utc::now()),
                _ => {}
            }
            if error.is_some() {
                state.last_error = error;
            }
        }
        debug!("Component '{}' state changed to: {:?}", component, phase);
    }

    /// Snapshot of one component's state
    pub fn get_component_state(&self, component: &str) -> Option<ComponentState> {
        self.inner.read().states.get(component).cloned()
    }

    /// Snapshot of every component's state
    pub fn get_all_component_states(&self) -> HashMap<String, ComponentState> {
        self.inner.read().states.clone()
    }
}
