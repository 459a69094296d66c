pub mod app;
pub mod component;
pub mod config;
pub mod error;
pub mod events;
pub mod graph;
pub mod health;
pub mod hooks;
pub mod retry;
pub mod simulated;

pub use app::{ComponentState, Orchestrator, Phase, ShutdownReason, SupervisorOptions};
pub use component::{overall_health, Component, HealthReport, HealthStatus};
pub use config::{ComponentConfig, LifelineConfig, RetrySettings, SupervisorConfig};
pub use error::{LifelineError, Result};
pub use events::{EventBus, EventBusError, EventFilter, EventKind, EventReceiver, LifecycleEvent};
pub use graph::DependencyGraph;
pub use health::HealthMonitor;
pub use hooks::{hook_fn, FnHook, Hook, HookFuture, HookPhase, HookRegistry};
pub use retry::{retry_with_backoff, RetryConfig};
pub use simulated::SimulatedComponent;
