//! In-process telemetry bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`TelemetryBus`] carries [`NotificationEvent`]s emitted by the router and
//! the dispatcher. Publishing never blocks and never fails the pipeline; it
//! is shared via `Arc<TelemetryBus>`.

use chrono::{DateTime, Utc};
use lernia_core::types::{RequestId, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// An operation was routed to a router with no handler for it.
pub const EVENT_OPERATION_UNSUPPORTED: &str = "operation.unsupported";

/// A notification email was handed to the mail transport.
pub const EVENT_NOTIFICATION_SENT: &str = "notification.sent";

/// A notification could not be delivered to one recipient.
pub const EVENT_NOTIFICATION_FAILED: &str = "notification.failed";

// ---------------------------------------------------------------------------
// NotificationEvent
// ---------------------------------------------------------------------------

/// Something observable that happened inside the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    /// Dot-separated event name, e.g. `"notification.sent"`.
    pub event_type: String,

    /// Correlation id of the operation being handled, when known.
    pub request_id: Option<RequestId>,

    /// The affected user, for per-recipient events.
    pub user_id: Option<UserId>,

    /// Free-form JSON payload carrying event-specific data.
    pub payload: serde_json::Value,

    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl NotificationEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            request_id: None,
            user_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<RequestId>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<UserId>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// TelemetryBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// Fan-out bus for pipeline telemetry.
///
/// When the buffer is full the oldest events are dropped and slow
/// subscribers observe `RecvError::Lagged`.
pub struct TelemetryBus {
    sender: broadcast::Sender<NotificationEvent>,
}

impl TelemetryBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: NotificationEvent) {
        // A SendError only means there are no subscribers.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.sender.subscribe()
    }
}

impl Default for TelemetryBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Write every event from `receiver` to the log until the bus is dropped.
pub async fn log_events(mut receiver: broadcast::Receiver<NotificationEvent>) {
    loop {
        match receiver.recv().await {
            Ok(event) => {
                tracing::debug!(
                    event_type = %event.event_type,
                    request_id = event.request_id.as_deref().unwrap_or("-"),
                    user_id = event.user_id.as_deref().unwrap_or("-"),
                    payload = %event.payload,
                    "Telemetry event"
                );
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "Telemetry log lagged");
            }
            Err(broadcast::error::RecvError::Closed) => {
                tracing::info!("Telemetry bus closed, event log shutting down");
                break;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
