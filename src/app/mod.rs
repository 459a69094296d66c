mod health;
mod invoke;
mod orchestrator;
mod runtime;
mod shutdown;
mod startup;
mod state;
mod types;


pub use orchestrator::Orchestrator;
pub use types::{ComponentState, Phase, ShutdownReason, SupervisorOptions};
