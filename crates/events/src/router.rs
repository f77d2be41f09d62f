//! Operation router.
//!
//! Looks up the handler registered for `(router name, operation)` and hands
//! the envelope to its inbox without waiting for the handling to finish. The
//! handler answers the caller directly through the delivery's reply channel.
//! Operations with no registered handler are answered with
//! [`OperationReply::Unsupported`]; the router itself never fails on them.

use std::sync::Arc;

use lernia_core::error::CoreError;
use lernia_core::operation::{OperationEnvelope, OperationReply};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::bus::{NotificationEvent, TelemetryBus, EVENT_OPERATION_UNSUPPORTED};
use crate::handler::Delivery;
use crate::registry::OperationRegistry;

/// What the router did with one envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Enqueued on the handler's inbox.
    Forwarded,
    /// No handler registered; the caller got an unsupported reply.
    Unsupported,
    /// A handler is registered but its pool has shut down.
    HandlerUnavailable,
}

pub struct OperationRouter {
    name: Arc<str>,
    registry: Arc<OperationRegistry>,
    telemetry: Option<Arc<TelemetryBus>>,
}

impl OperationRouter {
    /// `name` is this router's identity in the registry; it is fixed for the
    /// router's lifetime.
    pub fn new(name: impl Into<Arc<str>>, registry: Arc<OperationRegistry>) -> Self {
        Self {
            name: name.into(),
            registry,
            telemetry: None,
        }
    }

    pub fn with_telemetry(mut self, bus: Arc<TelemetryBus>) -> Self {
        self.telemetry = Some(bus);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Forward one delivery. Never blocks on the handler.
    pub fn route(&self, delivery: Delivery) -> RouteOutcome {
        let operation = delivery.envelope.operation.as_str();

        let Some(handler) = self.registry.get(&self.name, operation) else {
            tracing::warn!(
                router = %self.name,
                operation,
                request_id = %delivery.envelope.request_id,
                "Unsupported operation"
            );
            self.publish(
                NotificationEvent::new(EVENT_OPERATION_UNSUPPORTED)
                    .with_request_id(delivery.envelope.request_id.clone())
                    .with_payload(json!({ "router": &*self.name, "operation": operation })),
            );
            let reply = OperationReply::unsupported(&delivery.envelope);
            delivery.reply(reply);
            return RouteOutcome::Unsupported;
        };

        match handler.tell(delivery) {
            Ok(()) => RouteOutcome::Forwarded,
            Err(delivery) => {
                tracing::error!(
                    router = %self.name,
                    handler = handler.name(),
                    operation = %delivery.envelope.operation,
                    "Handler pool is not accepting work"
                );
                let err = CoreError::Internal(format!("handler {} is unavailable", handler.name()));
                let reply = OperationReply::error(delivery.envelope.request_id.clone(), &err);
                delivery.reply(reply);
                RouteOutcome::HandlerUnavailable
            }
        }
    }

    /// Route deliveries from `inbox` until it closes or `cancel` fires.
    pub async fn run(&self, mut inbox: mpsc::UnboundedReceiver<Delivery>, cancel: CancellationToken) {
        tracing::info!(router = %self.name, routes = self.registry.len(), "Operation router started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(router = %self.name, "Operation router shutting down");
                    break;
                }
                next = inbox.recv() => {
                    match next {
                        Some(delivery) => {
                            self.route(delivery);
                        }
                        None => {
                            tracing::info!(router = %self.name, "Router inbox closed");
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Run the router on its own task.
    pub fn spawn(self, cancel: CancellationToken) -> (RouterRef, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(async move { self.run(rx, cancel).await });
        (RouterRef { inbox: tx }, handle)
    }

    fn publish(&self, event: NotificationEvent) {
        if let Some(bus) = &self.telemetry {
            bus.publish(event);
        }
    }
}

/// Caller-side address of a running router.
#[derive(Debug, Clone)]
pub struct RouterRef {
    inbox: mpsc::UnboundedSender<Delivery>,
}

impl RouterRef {
    /// Submit without asking for a reply.
    pub fn submit(&self, envelope: OperationEnvelope) -> Result<(), CoreError> {
        self.inbox
            .send(Delivery::new(envelope))
            .map_err(|_| CoreError::Internal("router has shut down".to_string()))
    }

    /// Submit and wait for the handler's answer.
    ///
    /// Returns `Ok(None)` when the operation completed without a reply, which
    /// is the contract of fire-and-forget operations.
    pub async fn ask(&self, envelope: OperationEnvelope) -> Result<Option<OperationReply>, CoreError> {
        let (delivery, reply) = Delivery::with_reply(envelope);
        self.inbox
            .send(delivery)
            .map_err(|_| CoreError::Internal("router has shut down".to_string()))?;
        Ok(reply.await.ok())
    }
}
