use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::retry::RetryConfig;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct LifelineConfig {
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub components: Vec<ComponentConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SupervisorConfig {
    /// Per-attempt limit for component start, in milliseconds
    pub start_timeout_ms: Option<u64>,

    /// Per-attempt limit for component stop, in milliseconds
    pub stop_timeout_ms: Option<u64>,

    /// Lifecycle event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// Interval of the background health monitor
    #[serde(default = "default_health_interval")]
    pub health_interval_seconds: u64,
}

/// Declarative component run by the `lifeline` binary
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ComponentConfig {
    pub name: String,

    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(default)]
    pub priority: i32,

    /// Simulated startup work
    #[serde(default)]
    pub start_delay_ms: u64,

    /// Simulated shutdown work
    #[serde(default)]
    pub stop_delay_ms: u64,

    /// Number of start attempts that fail before one succeeds
    #[serde(default)]
    pub fail_start_attempts: u32,

    /// Make every stop attempt fail
    #[serde(default)]
    pub fail_stop: bool,

    pub retry: Option<RetrySettings>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig::new(
            self.max_attempts,
            Duration::from_millis(self.initial_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.backoff_multiplier,
        )
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            start_timeout_ms: None,
            stop_timeout_ms: None,
            event_bus_capacity: default_event_bus_capacity(),
            health_interval_seconds: default_health_interval(),
        }
    }
}

impl LifelineConfig {
    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default(
                "supervisor.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .set_default(
                "supervisor.health_interval_seconds",
                default_health_interval() as i64,
            )?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with LIFELINE_ prefix
            .add_source(
                Environment::with_prefix("LIFELINE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: LifelineConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.supervisor.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        if self.supervisor.health_interval_seconds == 0 {
            return Err(ConfigError::Message(
                "Health interval must be greater than 0".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for component in &self.components {
            if component.name.trim().is_empty() {
                return Err(ConfigError::Message(
                    "Component name must not be empty".to_string(),
                ));
            }

            if !seen.insert(component.name.as_str()) {
                return Err(ConfigError::Message(format!(
                    "Component {} is declared more than once",
                    component.name
                )));
            }

            if let Some(retry) = &component.retry {
                if retry.max_attempts == 0 {
                    return Err(ConfigError::Message(format!(
                        "Component {}: retry.max_attempts must be greater than 0",
                        component.name
                    )));
                }
                if retry.backoff_multiplier < 1.0 {
                    return Err(ConfigError::Message(format!(
                        "Component {}: retry.backoff_multiplier must be at least 1.0",
                        component.name
                    )));
                }
                if retry.max_delay_ms < retry.initial_delay_ms {
                    return Err(ConfigError::Message(format!(
                        "Component {}: retry.max_delay_ms must not be below initial_delay_ms",
                        component.name
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.supervisor.health_interval_seconds)
    }
}

// Default value functions
fn default_event_bus_capacity() -> usize {
    256
}
fn default_health_interval() -> u64 {
    30
}
fn default_max_attempts() -> u32 {
    3
}
fn default_initial_delay() -> u64 {
    100
}
fn default_max_delay() -> u64 {
    5_000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
