use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::LifelineError;

type RetryPredicate = Arc<dyn Fn(&anyhow::Error) -> bool + Send + Sync>;

/// Retry strategy attached to a component's start/stop transitions
#[derive(Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Multiplicative growth factor (`>= 1.0`)
    pub backoff_multiplier: f64,
    retryable: Option<RetryPredicate>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            retryable: None,
        }
    }
}

impl fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_attempts", &self.max_attempts)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("retryable", &self.retryable.is_some())
            .finish()
    }
}

impl RetryConfig {
    pub fn new(
        max_attempts: u32,
        initial_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay,
            backoff_multiplier: backoff_multiplier.max(1.0),
            retryable: None,
        }
    }

    /// A policy that makes exactly one attempt
    pub fn single_attempt() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO, 1.0)
    }

    /// Restrict retries to errors accepted by `predicate`
    pub fn retry_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&anyhow::Error) -> bool + Send + Sync + 'static,
    {
        self.retryable = Some(Arc::new(predicate));
        self
    }

    /// Restrict retries to errors whose chain contains an `E`
    pub fn retry_on<E>(self) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.retry_if(|err| err.chain().any(|cause| cause.is::<E>()))
    }

    /// Whether a failed attempt may be retried.
    ///
    /// Panics and cancellation are never retried.
    pub fn is_retryable(&self, err: &anyhow::Error) -> bool {
        if matches!(
            err.downcast_ref::<LifelineError>(),
            Some(LifelineError::ComponentPanic { .. }) | Some(LifelineError::Cancelled)
        ) {
            return false;
        }

        match &self.retryable {
            Some(predicate) => predicate(err),
            None => true,
        }
    }

    /// Delay after the given zero-based failed attempt:
    /// `initial_delay * backoff_multiplier^attempt`, capped at `max_delay`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exp);

        if !secs.is_finite() || secs < 0.0 || secs > self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

/// Run `operation` until it succeeds, the error is not retryable, attempts
/// run out or `token` is cancelled.
///
/// Exhaustion returns the last error produced by `operation` unchanged.
pub async fn retry_with_backoff<T, F, Fut>(
    token: &CancellationToken,
    config: &RetryConfig,
    operation: F,
) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    retry_with_notify(token, config, |_, _, _| {}, operation).await
}

/// Same as [`retry_with_backoff`], calling `on_retry(next_attempt, delay, err)`
/// each time a retry is scheduled, before the backoff sleep.
pub async fn retry_with_notify<T, F, Fut, N>(
    token: &CancellationToken,
    config: &RetryConfig,
    mut on_retry: N,
    mut operation: F,
) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
    N: FnMut(u32, Duration, &anyhow::Error),
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        if token.is_cancelled() {
            return Err(LifelineError::Cancelled.into());
        }

        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !config.is_retryable(&err) {
            debug!("Error is not retryable: {}", err);
            return Err(err);
        }

        if attempt + 1 >= max_attempts {
            warn!("Giving up after {} attempts: {}", max_attempts, err);
            return Err(err);
        }

        let delay = config.delay_for(attempt);
        debug!(
            "Attempt {}/{} failed: {}, retrying in {:?}",
            attempt + 1,
            max_attempts,
            err,
            delay
        );
        on_retry(attempt + 2, delay, &err);

        tokio::select! {
            _ = token.cancelled() => return Err(LifelineError::Cancelled.into()),
            _ = tokio::time::sleep(delay) => {}
        }

        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryConfig {
        RetryConfig::new(
            max_attempts,
            Duration::from_millis(1),
            Duration::from_millis(5),
            2.0,
        )
    }

    #[test]
    fn test_delay_growth_and_cap() {
        let config = RetryConfig::new(
            5,
            Duration::from_millis(100),
            Duration::from_millis(500),
            2.0,
        );
        assert_eq!(config.delay_for(0), Duration::from_millis(100));
        assert_eq!(config.delay_for(1), Duration::from_millis(200));
        assert_eq!(config.delay_for(2), Duration::from_millis(400));
        assert_eq!(config.delay_for(3), Duration::from_millis(500));
        assert_eq!(config.delay_for(200), Duration::from_millis(500));
    }

    #[test]
    fn test_constructor_clamps_values() {
        let config = RetryConfig::new(0, Duration::ZERO, Duration::ZERO, 0.5);
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.backoff_multiplier, 1.0);
    }

    #[tokio::test]
    async fn test_succeeds_after_failures() {
        let token = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result = retry_with_backoff(&token, &fast(5), move || async move {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(anyhow::anyhow!("attempt {} failed", n))
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let token = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let err = retry_with_backoff(&token, &fast(4), move || async move {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            Err::<(), _>(anyhow::anyhow!("failure {}", n))
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(err.to_string(), "failure 4");
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_sleep_after_final_attempt() {
        let token = CancellationToken::new();
        let config = RetryConfig::new(2, Duration::from_secs(10), Duration::from_secs(10), 1.0);
        let started = tokio::time::Instant::now();

        let result = retry_with_backoff(&token, &config, || async {
            Err::<(), _>(anyhow::anyhow!("down"))
        })
        .await;

        assert!(result.is_err());
        // one sleep between the two attempts, none after the last
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(10));
        assert!(elapsed < Duration::from_secs(20));
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let token = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let config = fast(5).retry_on::<std::io::Error>();

        let err = retry_with_backoff(&token, &config, move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(anyhow::anyhow!("bad input"))
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.to_string(), "bad input");
    }

    #[tokio::test]
    async fn test_allow_listed_error_is_retried() {
        let token = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let config = fast(3).retry_on::<std::io::Error>();

        let _ = retry_with_backoff(&token, &config, move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(std::io::Error::new(std::io::ErrorKind::TimedOut, "slow").into())
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_panic_is_not_retried() {
        let token = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let _ = retry_with_backoff(&token, &fast(5), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(LifelineError::panic("db", "boom").into())
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let token = CancellationToken::new();
        token.cancel();
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let err = retry_with_backoff(&token, &fast(3), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(matches!(
            err.downcast_ref::<LifelineError>(),
            Some(LifelineError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_backoff_sleep() {
        let token = CancellationToken::new();
        let config = RetryConfig::new(3, Duration::from_secs(60), Duration::from_secs(60), 1.0);
        let canceller = token.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let err = tokio::time::timeout(
            Duration::from_secs(5),
            retry_with_backoff(&token, &config, || async {
                Err::<(), _>(anyhow::anyhow!("down"))
            }),
        )
        .await
        .expect("retry should be interrupted")
        .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<LifelineError>(),
            Some(LifelineError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_notify_runs_before_each_retry() {
        let token = CancellationToken::new();
        let mut scheduled = Vec::new();

        let _ = retry_with_notify(
            &token,
            &fast(3),
            |next, delay, err| scheduled.push((next, delay, err.to_string())),
            || async { Err::<(), _>(anyhow::anyhow!("down")) },
        )
        .await;

        assert_eq!(
            scheduled,
            vec![
                (2, Duration::from_millis(1), "down".to_string()),
                (3, Duration::from_millis(2), "down".to_string()),
            ]
        );
    }
}
