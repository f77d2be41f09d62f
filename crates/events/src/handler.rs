//! Operation handlers and the worker pools that run them.
//!
//! A handler is registered once and runs as a [`HandlerPool`]: an unbounded
//! inbox drained by a fixed number of worker tasks. Each worker takes one
//! [`Delivery`] at a time and runs it to completion on its own task, so a
//! panicking handler loses that delivery only.

use std::sync::Arc;

use async_trait::async_trait;
use lernia_core::error::CoreError;
use lernia_core::operation::{OperationEnvelope, OperationReply};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::dispatcher::DispatchError;
use crate::ports::StoreError;

// ---------------------------------------------------------------------------
// Handler contract
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Bad data from the caller; surfaced to the caller as-is.
    #[error(transparent)]
    Client(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl HandlerError {
    /// The reply a caller receives for this error.
    pub fn to_reply(&self, envelope: &OperationEnvelope) -> OperationReply {
        match self {
            HandlerError::Unsupported(_) => OperationReply::unsupported(envelope),
            HandlerError::Client(err) => OperationReply::error(envelope.request_id.clone(), err),
            other => OperationReply::error(
                envelope.request_id.clone(),
                &CoreError::Internal(other.to_string()),
            ),
        }
    }
}

/// A unit of work reachable through the router.
#[async_trait]
pub trait OperationHandler: Send + Sync + 'static {
    /// Name used in logs and as the handler's identity in the registry.
    fn name(&self) -> &'static str;

    /// Operations this handler accepts.
    fn operations(&self) -> &'static [&'static str];

    /// Handle one envelope.
    ///
    /// `Ok(None)` means the operation has no reply contract
    /// (fire-and-forget); `Ok(Some(_))` is sent back to the caller.
    async fn handle(&self, envelope: &OperationEnvelope) -> Result<Option<Value>, HandlerError>;
}

// ---------------------------------------------------------------------------
// Mailbox
// ---------------------------------------------------------------------------

/// An envelope in flight, with the address the handler answers to.
#[derive(Debug)]
pub struct Delivery {
    pub envelope: OperationEnvelope,
    pub reply_to: Option<oneshot::Sender<OperationReply>>,
}

impl Delivery {
    pub fn new(envelope: OperationEnvelope) -> Self {
        Self {
            envelope,
            reply_to: None,
        }
    }

    pub fn with_reply(envelope: OperationEnvelope) -> (Self, oneshot::Receiver<OperationReply>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                envelope,
                reply_to: Some(tx),
            },
            rx,
        )
    }

    /// Answer the caller, if it asked for an answer and is still listening.
    pub fn reply(self, reply: OperationReply) {
        if let Some(tx) = self.reply_to {
            let _ = tx.send(reply);
        }
    }
}

/// Address of a running handler pool.
#[derive(Debug, Clone)]
pub struct HandlerRef {
    name: Arc<str>,
    inbox: mpsc::UnboundedSender<Delivery>,
}

impl HandlerRef {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enqueue without waiting; gives the delivery back if the pool is gone.
    pub fn tell(&self, delivery: Delivery) -> Result<(), Delivery> {
        self.inbox.send(delivery).map_err(|e| e.0)
    }

    pub fn is_closed(&self) -> bool {
        self.inbox.is_closed()
    }
}

// ---------------------------------------------------------------------------
// HandlerPool
// ---------------------------------------------------------------------------

pub struct HandlerPool {
    handler: Arc<dyn OperationHandler>,
    handle: HandlerRef,
    workers: Vec<JoinHandle<()>>,
}

impl HandlerPool {
    /// Spawn `workers` tasks (at least one) serving `handler`.
    pub fn spawn(handler: Arc<dyn OperationHandler>, workers: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let inbox = Arc::new(Mutex::new(rx));

        let workers = (0..workers.max(1))
            .map(|worker_id| {
                tokio::spawn(run_worker(worker_id, Arc::clone(&handler), Arc::clone(&inbox)))
            })
            .collect();

        tracing::info!(handler = handler.name(), "Handler pool started");

        Self {
            handle: HandlerRef {
                name: Arc::from(handler.name()),
                inbox: tx,
            },
            handler,
            workers,
        }
    }

    pub fn handle(&self) -> HandlerRef {
        self.handle.clone()
    }

    pub fn operations(&self) -> &'static [&'static str] {
        self.handler.operations()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Wait for the workers to drain the inbox and exit.
    ///
    /// Workers stop once every [`HandlerRef`] (including those held by the
    /// registry) has been dropped.
    pub async fn join(self) {
        let name = self.handler.name();
        drop(self.handle);
        for worker in self.workers {
            if let Err(e) = worker.await {
                tracing::error!(handler = name, error = %e, "Handler worker panicked");
            }
        }
        tracing::info!(handler = name, "Handler pool stopped");
    }
}

async fn run_worker(
    worker_id: usize,
    handler: Arc<dyn OperationHandler>,
    inbox: Arc<Mutex<mpsc::UnboundedReceiver<Delivery>>>,
) {
    loop {
        let next = inbox.lock().await.recv().await;
        let Some(delivery) = next else {
            break;
        };

        let span = tracing::info_span!(
            "operation",
            request_id = %delivery.envelope.request_id,
            operation = %delivery.envelope.operation,
            handler = handler.name(),
            worker_id
        );

        let task = tokio::spawn(process(Arc::clone(&handler), delivery).instrument(span));
        if let Err(e) = task.await {
            tracing::error!(handler = handler.name(), worker_id, error = %e, "Operation task panicked");
        }
    }
}

async fn process(handler: Arc<dyn OperationHandler>, delivery: Delivery) {
    let result = handler.handle(&delivery.envelope).await;
    match result {
        Ok(Some(result)) => {
            let request_id = delivery.envelope.request_id.clone();
            delivery.reply(OperationReply::Ok { request_id, result });
        }
        Ok(None) => {
            tracing::debug!("Operation handled");
        }
        Err(err) => {
            match &err {
                HandlerError::Client(e) => {
                    tracing::warn!(error = %e, code = e.code(), "Operation rejected")
                }
                HandlerError::Unsupported(op) => {
                    tracing::warn!(operation = %op, "Handler does not support operation")
                }
                other => tracing::error!(error = %other, "Operation failed"),
            }
            let reply = err.to_reply(&delivery.envelope);
            delivery.reply(reply);
        }
    }
}
