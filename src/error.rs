use std::time::Duration;
use thiserror::Error;

use crate::app::Phase;

#[derive(Error, Debug)]
pub enum LifelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Component already registered: {name}")]
    DuplicateComponent { name: String },

    #[error("Component not found: {name}")]
    ComponentNotFound { name: String },

    #[error("Component {name} is still required by: {}", .dependents.join(", "))]
    DependentsExist { name: String, dependents: Vec<String> },

    #[error("Component {component} depends on unknown component {dependency}")]
    MissingDependency { component: String, dependency: String },

    #[error("Dependency cycle detected at component {component}")]
    CycleDetected { component: String },

    #[error("Operation requires phase {expected:?}, supervisor is {actual:?}")]
    InvalidPhase { expected: Phase, actual: Phase },

    #[error("Component {component} failed to start at level {level}: {source}")]
    StartupFailed {
        component: String,
        level: usize,
        /// Every component of the level that failed, sorted by name.
        failed: Vec<String>,
        #[source]
        source: anyhow::Error,
    },

    #[error("Shutdown completed with errors, last from {component}: {source}")]
    ShutdownPartialFailure {
        component: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Component {component} panicked: {message}")]
    ComponentPanic { component: String, message: String },

    #[error("Component {component} {operation} timed out after {timeout:?}")]
    Timeout {
        component: String,
        operation: &'static str,
        timeout: Duration,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Hook {hook} failed: {source}")]
    HookFailed {
        hook: String,
        #[source]
        source: anyhow::Error,
    },
}

impl LifelineError {
    pub fn not_found<S: Into<String>>(name: S) -> Self {
        Self::ComponentNotFound { name: name.into() }
    }

    pub fn panic<S: Into<String>>(component: S, message: S) -> Self {
        Self::ComponentPanic {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Whether this error is one of the graph validation errors.
    pub fn is_graph_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateComponent { .. }
                | Self::ComponentNotFound { .. }
                | Self::DependentsExist { .. }
                | Self::MissingDependency { .. }
                | Self::CycleDetected { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, LifelineError>;
