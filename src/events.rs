use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::Phase;

/// What happened in a lifecycle transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    SupervisorStarting,
    SupervisorRunning,
    SupervisorStopping,
    SupervisorStopped,
    ComponentStarting,
    ComponentRunning,
    ComponentFailed,
    ComponentStopping,
    ComponentStopped,
    RollbackStarted,
    RetryScheduled,
}

impl EventKind {
    /// Get the event kind as a string for filtering and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::SupervisorStarting => "supervisor_starting",
            EventKind::SupervisorRunning => "supervisor_running",
            EventKind::SupervisorStopping => "supervisor_stopping",
            EventKind::SupervisorStopped => "supervisor_stopped",
            EventKind::ComponentStarting => "component_starting",
            EventKind::ComponentRunning => "component_running",
            EventKind::ComponentFailed => "component_failed",
            EventKind::ComponentStopping => "component_stopping",
            EventKind::ComponentStopped => "component_stopped",
            EventKind::RollbackStarted => "rollback_started",
            EventKind::RetryScheduled => "retry_scheduled",
        }
    }

    /// The phase a subject enters with this event
    pub fn phase(&self) -> Phase {
        match self {
            EventKind::SupervisorStarting | EventKind::ComponentStarting => Phase::Starting,
            EventKind::SupervisorRunning | EventKind::ComponentRunning => Phase::Running,
            EventKind::SupervisorStopping
            | EventKind::ComponentStopping
            | EventKind::RollbackStarted => Phase::Stopping,
            EventKind::SupervisorStopped | EventKind::ComponentStopped => Phase::Stopped,
            EventKind::ComponentFailed => Phase::Failed,
            EventKind::RetryScheduled => Phase::Starting,
        }
    }
}

/// A lifecycle transition, delivered to hooks and event bus subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub kind: EventKind,
    pub phase: Phase,
    /// `None` for supervisor-level transitions
    pub component: Option<String>,
    /// Identifier of the start or stop cycle that produced the event
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl LifecycleEvent {
    pub fn new(kind: EventKind, component: Option<&str>, run_id: Uuid) -> Self {
        Self {
            kind,
            phase: kind.phase(),
            component: component.map(str::to_string),
            run_id,
            timestamp: Utc::now(),
            data: serde_json::Value::Null,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match &self.component {
            Some(component) => format!("{} ({})", self.kind.as_str(), component),
            None => self.kind.as_str().to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Receiver lagged behind by {0} events")]
    Lagged(u64),

    #[error("Event bus channel closed")]
    ChannelClosed,
}

/// Broadcast channel carrying lifecycle events to observers
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }

    /// Subscribe with a filter applied on receive
    pub fn subscribe_filtered<S: Into<String>>(&self, filter: EventFilter, name: S) -> EventReceiver {
        EventReceiver::new(self.sender.subscribe(), filter, name.into())
    }

    /// Publish an event to all subscribers.
    ///
    /// Fails when nobody is subscribed.
    pub fn publish(&self, event: LifecycleEvent) -> Result<usize, EventBusError> {
        debug!("Publishing event: {}", event.description());

        match event.kind {
            EventKind::ComponentFailed => {
                error!("Lifecycle event: {} {}", event.description(), event.data);
            }
            EventKind::RollbackStarted => {
                warn!("Lifecycle event: {}", event.description());
            }
            EventKind::SupervisorRunning | EventKind::SupervisorStopped => {
                info!("Lifecycle event: {}", event.description());
            }
            _ => {}
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    All,
    Kinds(Vec<EventKind>),
    Components(Vec<String>),
}

impl EventFilter {
    pub fn matches(&self, event: &LifecycleEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Kinds(kinds) => kinds.contains(&event.kind),
            EventFilter::Components(components) => event
                .component
                .as_ref()
                .map(|c| components.contains(c))
                .unwrap_or(false),
        }
    }
}

/// Event receiver that skips events rejected by its filter
pub struct EventReceiver {
    receiver: broadcast::Receiver<LifecycleEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(
        receiver: broadcast::Receiver<LifecycleEvent>,
        filter: EventFilter,
        name: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next matching event
    pub async fn recv(&mut self) -> Result<LifecycleEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged(n));
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Try to receive a matching event without blocking
    pub fn try_recv(&mut self) -> Result<Option<LifecycleEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged(n));
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}
