use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::component::{Component, HealthReport};
use crate::config::ComponentConfig;
use crate::error::LifelineError;
use crate::retry::RetryConfig;

/// Component driven entirely by a `[[components]]` configuration entry.
///
/// Sleeps for the configured delays, fails the first
/// `fail_start_attempts` start calls and optionally every stop call.
pub struct SimulatedComponent {
    config: ComponentConfig,
    start_attempts: AtomicU32,
    running: AtomicBool,
}

impl SimulatedComponent {
    pub fn new(config: ComponentConfig) -> Self {
        Self {
            config,
            start_attempts: AtomicU32::new(0),
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn start_attempts(&self) -> u32 {
        self.start_attempts.load(Ordering::SeqCst)
    }
}

async fn simulate_work(token: &CancellationToken, millis: u64) -> anyhow::Result<()> {
    if millis == 0 {
        return Ok(());
    }
    tokio::select! {
        _ = token.cancelled() => Err(LifelineError::Cancelled.into()),
        _ = tokio::time::sleep(Duration::from_millis(millis)) => Ok(()),
    }
}

#[async_trait]
impl Component for SimulatedComponent {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn dependencies(&self) -> Vec<String> {
        self.config.dependencies.clone()
    }

    fn priority(&self) -> i32 {
        self.config.priority
    }

    async fn start(&self, token: &CancellationToken) -> anyhow::Result<()> {
        let attempt = self.start_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Starting {} (attempt {})", self.config.name, attempt);

        simulate_work(token, self.config.start_delay_ms).await?;

        if attempt <= self.config.fail_start_attempts {
            anyhow::bail!(
                "{} failed to start (attempt {} of {} scripted failures)",
                self.config.name,
                attempt,
                self.config.fail_start_attempts
            );
        }

        self.running.store(true, Ordering::SeqCst);
        info!("{} is up", self.config.name);
        Ok(())
    }

    async fn stop(&self, token: &CancellationToken) -> anyhow::Result<()> {
        if simulate_work(token, self.config.stop_delay_ms).await.is_err() {
            debug!("{} cut its drain short on cancellation", self.config.name);
        }
        self.running.store(false, Ordering::SeqCst);

        if self.config.fail_stop {
            anyhow::bail!("{} failed to release its resources", self.config.name);
        }

        info!("{} is down", self.config.name);
        Ok(())
    }

    async fn health(&self, _token: &CancellationToken) -> HealthReport {
        if self.is_running() {
            HealthReport::healthy("running").with_detail("start_attempts", self.start_attempts())
        } else {
            HealthReport::unhealthy("not running")
        }
    }

    fn retry_config(&self) -> Option<RetryConfig> {
        self.config.retry.as_ref().map(|retry| retry.to_retry_config())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::HealthStatus;
    use crate::config::RetrySettings;

    fn config(name: &str) -> ComponentConfig {
        ComponentConfig {
            name: name.to_string(),
            dependencies: vec!["db".to_string()],
            priority: 5,
            start_delay_ms: 0,
            stop_delay_ms: 0,
            fail_start_attempts: 0,
            fail_stop: false,
            retry: None,
        }
    }

    #[tokio::test]
    async fn test_scripted_start_failures() {
        let mut cfg = config("api");
        cfg.fail_start_attempts = 2;
        let component = SimulatedComponent::new(cfg);
        let token = CancellationToken::new();

        assert_eq!(component.dependencies(), vec!["db"]);
        assert_eq!(component.priority(), 5);
        assert!(component.retry_config().is_none());

        assert!(component.start(&token).await.is_err());
        assert!(component.start(&token).await.is_err());
        assert!(!component.is_running());
        assert_eq!(component.health(&token).await.status, HealthStatus::Unhealthy);

        component.start(&token).await.unwrap();
        assert!(component.is_running());
        assert_eq!(component.start_attempts(), 3);
        assert_eq!(component.health(&token).await.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_failing_stop_still_marks_down() {
        let mut cfg = config("cache");
        cfg.fail_stop = true;
        let component = SimulatedComponent::new(cfg);
        let token = CancellationToken::new();

        component.start(&token).await.unwrap();
        assert!(component.stop(&token).await.is_err());
        assert!(!component.is_running());
    }

    #[tokio::test]
    async fn test_delay_observes_cancellation() {
        let mut cfg = config("slow");
        cfg.start_delay_ms = 60_000;
        let component = SimulatedComponent::new(cfg);
        let token = CancellationToken::new();
        token.cancel();

        let err = component.start(&token).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LifelineError>(),
            Some(LifelineError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_cancelled_stop_still_releases() {
        let mut cfg = config("worker");
        cfg.stop_delay_ms = 60_000;
        let component = SimulatedComponent::new(cfg);
        let token = CancellationToken::new();

        component.start(&token).await.unwrap();
        token.cancel();
        component.stop(&token).await.unwrap();
        assert!(!component.is_running());
    }

    #[test]
    fn test_retry_from_config() {
        let mut cfg = config("api");
        cfg.retry = Some(RetrySettings {
            max_attempts: 5,
            initial_delay_ms: 20,
            max_delay_ms: 200,
            backoff_multiplier: 3.0,
        });
        let retry = SimulatedComponent::new(cfg).retry_config().unwrap();
        assert_eq!(retry.max_attempts, 5);
        assert_eq!(retry.initial_delay, Duration::from_millis(20));
        assert_eq!(retry.backoff_multiplier, 3.0);
    }
}
