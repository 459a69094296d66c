use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::component::Component;
use crate::error::LifelineError;
use crate::events::{EventBus, EventKind, LifecycleEvent};
use crate::retry::retry_with_notify;

/// Component transition driven by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) enum Transition {
    Start,
    Stop,
}

impl Transition {
    pub(super) fn as_str(self) -> &'static str {
        match self {
            Transition::Start => "start",
            Transition::Stop => "stop",
        }
    }
}

type CallFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;

fn call<'a>(
    component: &'a Arc<dyn Component>,
    transition: Transition,
    token: &'a CancellationToken,
) -> CallFuture<'a> {
    match transition {
        Transition::Start => component.start(token),
        Transition::Stop => component.stop(token),
    }
}

pub(super) fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// The only place user code runs: panics become `ComponentPanic` and an
/// optional timeout bounds the call.
pub(super) async fn guarded<Fut>(
    component: &str,
    operation: &'static str,
    timeout: Option<Duration>,
    fut: Fut,
) -> anyhow::Result<()>
where
    Fut: Future<Output = anyhow::Result<()>>,
{
    let caught = AssertUnwindSafe(fut).catch_unwind();

    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, caught).await {
            Ok(outcome) => outcome,
            Err(_) => {
                return Err(LifelineError::Timeout {
                    component: component.to_string(),
                    operation,
                    timeout: limit,
                }
                .into())
            }
        },
        None => caught.await,
    };

    match outcome {
        Ok(result) => result,
        Err(panic) => Err(LifelineError::panic(component.to_string(), panic_message(panic)).into()),
    }
}

/// Single guarded call, no retry
pub(super) async fn invoke_once(
    component: &Arc<dyn Component>,
    transition: Transition,
    token: &CancellationToken,
    timeout: Option<Duration>,
) -> anyhow::Result<()> {
    guarded(
        component.name(),
        transition.as_str(),
        timeout,
        call(component, transition, token),
    )
    .await
}

/// Guarded call wrapped in the component's retry policy, if it has one.
///
/// Scheduled retries are announced as `RetryScheduled` on `events`. A stop
/// on an already cancelled token still gets its one attempt.
pub(super) async fn invoke_with_retry(
    component: &Arc<dyn Component>,
    transition: Transition,
    token: &CancellationToken,
    timeout: Option<Duration>,
    events: &EventBus,
    run_id: Uuid,
) -> anyhow::Result<()> {
    let Some(config) = component.retry_config() else {
        return invoke_once(component, transition, token, timeout).await;
    };

    if transition == Transition::Stop && token.is_cancelled() {
        debug!("Token cancelled, stopping {} without retries", component.name());
        return invoke_once(component, transition, token, timeout).await;
    }

    let announce = |next_attempt: u32, delay: Duration, err: &anyhow::Error| {
        let _ = events.publish(
            LifecycleEvent::new(EventKind::RetryScheduled, Some(component.name()), run_id).with_data(
                serde_json::json!({
                    "operation": transition.as_str(),
                    "attempt": next_attempt,
                    "delay_ms": delay.as_millis() as u64,
                    "error": err.to_string(),
                }),
            ),
        );
    };

    retry_with_notify(token, &config, announce, move || {
        invoke_once(component, transition, token, timeout)
    })
    .await
}
