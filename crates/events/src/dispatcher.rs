//! Per-recipient notification delivery.
//!
//! [`NotificationDispatcher`] walks a recipient list in order. Each recipient
//! moves through template resolution, context personalisation, decryption and
//! sending on its own; a failure at any step ends that recipient only and is
//! recorded in the returned [`DispatchReport`]. The one exception is an
//! unreachable template store, which aborts the whole dispatch; the outcomes
//! collected up to that point travel with the error.

use std::sync::Arc;

use lernia_core::error::{CoreError, EMAIL_TEMPLATE_TYPE};
use lernia_core::notification::{NotificationContext, Recipient};
use lernia_core::types::UserId;
use serde_json::json;

use crate::bus::{
    NotificationEvent, TelemetryBus, EVENT_NOTIFICATION_FAILED, EVENT_NOTIFICATION_SENT,
};
use crate::ports::{Decryptor, MailError, MailTransport, TemplateError, TemplateResolver};

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Step at which a recipient's delivery stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStage {
    /// The user row could not be turned into a recipient.
    Contact,
    TemplateResolution,
    Decryption,
    Transport,
}

impl DeliveryStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStage::Contact => "contact",
            DeliveryStage::TemplateResolution => "template_resolution",
            DeliveryStage::Decryption => "decryption",
            DeliveryStage::Transport => "transport",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RecipientFailure {
    #[error("Invalid user record: {0}")]
    InvalidContact(CoreError),

    /// Unknown or blank template name; a client data error.
    #[error(transparent)]
    Template(CoreError),

    /// The template store itself could not be reached.
    #[error("Template store unavailable: {0}")]
    TemplateStore(String),

    #[error("Decrypted email is missing or blank")]
    BlankEmail,

    #[error(transparent)]
    Transport(MailError),
}

impl RecipientFailure {
    pub fn stage(&self) -> DeliveryStage {
        match self {
            RecipientFailure::InvalidContact(_) => DeliveryStage::Contact,
            RecipientFailure::Template(_) | RecipientFailure::TemplateStore(_) => {
                DeliveryStage::TemplateResolution
            }
            RecipientFailure::BlankEmail => DeliveryStage::Decryption,
            RecipientFailure::Transport(_) => DeliveryStage::Transport,
        }
    }

    /// Whether the failure affects every recipient, not just this one.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RecipientFailure::TemplateStore(_))
    }
}

#[derive(Debug)]
pub enum DeliveryStatus {
    Sent,
    Failed(RecipientFailure),
}

#[derive(Debug)]
pub struct RecipientOutcome {
    pub user_id: UserId,
    pub template_name: &'static str,
    pub status: DeliveryStatus,
}

/// Outcome of every recipient of one dispatch, in processing order.
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub outcomes: Vec<RecipientOutcome>,
}

impl DispatchReport {
    pub fn sent(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, DeliveryStatus::Sent))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.sent()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &RecipientFailure)> {
        self.outcomes.iter().filter_map(|o| match &o.status {
            DeliveryStatus::Failed(f) => Some((o.user_id.as_str(), f)),
            DeliveryStatus::Sent => None,
        })
    }

    pub fn is_clean(&self) -> bool {
        self.failed() == 0
    }

    pub fn merge(&mut self, other: DispatchReport) {
        self.outcomes.extend(other.outcomes);
    }

    /// Record a user that never became a recipient.
    pub fn record_invalid_contact(
        &mut self,
        user_id: impl Into<UserId>,
        template_name: &'static str,
        err: CoreError,
    ) {
        self.outcomes.push(RecipientOutcome {
            user_id: user_id.into(),
            template_name,
            status: DeliveryStatus::Failed(RecipientFailure::InvalidContact(err)),
        });
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The template store could not be reached. `partial` holds the outcomes
    /// of the recipients processed before the abort; those were already mailed.
    #[error("Dispatch aborted after {} recipient(s): {message}", .partial.outcomes.len())]
    TemplateStore {
        message: String,
        partial: DispatchReport,
    },
}

impl DispatchError {
    pub fn template_store(message: impl Into<String>) -> Self {
        DispatchError::TemplateStore {
            message: message.into(),
            partial: DispatchReport::default(),
        }
    }

    /// Outcomes collected before the dispatch was aborted.
    pub fn partial(&self) -> &DispatchReport {
        match self {
            DispatchError::TemplateStore { partial, .. } => partial,
        }
    }

    /// Put outcomes of earlier dispatches ahead of this one's partial report.
    pub fn after(self, earlier: DispatchReport) -> Self {
        match self {
            DispatchError::TemplateStore { message, partial } => {
                let mut outcomes = earlier;
                outcomes.merge(partial);
                DispatchError::TemplateStore {
                    message,
                    partial: outcomes,
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// NotificationDispatcher
// ---------------------------------------------------------------------------

pub struct NotificationDispatcher {
    templates: Arc<dyn TemplateResolver>,
    decryptor: Arc<dyn Decryptor>,
    mailer: Arc<dyn MailTransport>,
    telemetry: Option<Arc<TelemetryBus>>,
}

impl NotificationDispatcher {
    pub fn new(
        templates: Arc<dyn TemplateResolver>,
        decryptor: Arc<dyn Decryptor>,
        mailer: Arc<dyn MailTransport>,
    ) -> Self {
        Self {
            templates,
            decryptor,
            mailer,
            telemetry: None,
        }
    }

    pub fn with_telemetry(mut self, bus: Arc<TelemetryBus>) -> Self {
        self.telemetry = Some(bus);
        self
    }

    /// Deliver to every recipient, one attempt each, in list order.
    pub async fn dispatch(
        &self,
        recipients: &[Recipient],
        context: &NotificationContext,
    ) -> Result<DispatchReport, DispatchError> {
        let mut report = DispatchReport::default();

        for recipient in recipients {
            let status = match self.deliver(recipient, context).await {
                Ok(()) => DeliveryStatus::Sent,
                Err(failure) if failure.is_fatal() => {
                    return Err(DispatchError::TemplateStore {
                        message: failure.to_string(),
                        partial: report,
                    });
                }
                Err(failure) => DeliveryStatus::Failed(failure),
            };
            report.outcomes.push(RecipientOutcome {
                user_id: recipient.user_id.clone(),
                template_name: recipient.template_name,
                status,
            });
        }

        Ok(report)
    }

    /// Deliver to a single recipient.
    ///
    /// Every failure is logged here exactly once; callers only decide what
    /// to do with the returned value.
    pub async fn deliver(
        &self,
        recipient: &Recipient,
        context: &NotificationContext,
    ) -> Result<(), RecipientFailure> {
        let result = self.try_deliver(recipient, context).await;

        match &result {
            Ok(()) => {
                tracing::debug!(
                    user_id = %recipient.user_id,
                    template = recipient.template_name,
                    "Notification sent"
                );
                self.publish(
                    NotificationEvent::new(EVENT_NOTIFICATION_SENT)
                        .with_user(recipient.user_id.clone())
                        .with_payload(json!({ "template": recipient.template_name })),
                );
            }
            Err(failure) => {
                tracing::error!(
                    user_id = %recipient.user_id,
                    template = recipient.template_name,
                    stage = failure.stage().as_str(),
                    error = %failure,
                    "Failed to send batch notification"
                );
                self.publish(
                    NotificationEvent::new(EVENT_NOTIFICATION_FAILED)
                        .with_user(recipient.user_id.clone())
                        .with_payload(json!({
                            "template": recipient.template_name,
                            "stage": failure.stage().as_str(),
                            "error": failure.to_string(),
                        })),
                );
            }
        }

        result
    }

    async fn try_deliver(
        &self,
        recipient: &Recipient,
        context: &NotificationContext,
    ) -> Result<(), RecipientFailure> {
        let template = self.resolve_template(recipient.template_name).await?;

        let context = context.with_first_name(Some(&recipient.first_name));

        let email = self
            .decryptor
            .decrypt(&recipient.encrypted_email)
            .filter(|e| !e.trim().is_empty())
            .ok_or(RecipientFailure::BlankEmail)?;

        self.mailer
            .send(&[email], recipient.subject, &context, &template)
            .await
            .map_err(RecipientFailure::Transport)
    }

    async fn resolve_template(&self, name: &str) -> Result<String, RecipientFailure> {
        let invalid = |value: &str| {
            RecipientFailure::Template(CoreError::InvalidParameterValue {
                value: value.to_string(),
                kind: EMAIL_TEMPLATE_TYPE,
            })
        };

        if name.trim().is_empty() {
            return Err(invalid(name));
        }

        match self.templates.resolve(name).await {
            Ok(body) if body.trim().is_empty() => Err(invalid(name)),
            Ok(body) => Ok(body),
            Err(TemplateError::NotFound(missing)) => Err(invalid(&missing)),
            Err(TemplateError::Unavailable(msg)) => Err(RecipientFailure::TemplateStore(msg)),
        }
    }

    fn publish(&self, event: NotificationEvent) {
        if let Some(bus) = &self.telemetry {
            bus.publish(event);
        }
    }
}
