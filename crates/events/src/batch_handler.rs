//! Batch membership notifications.
//!
//! Handles the three batch operations:
//!
//! - `batchBulkNotification`: everyone currently on the batch gets the
//!   add or remove mail.
//! - `batchUpdateNotification`: the membership delta between two snapshots
//!   is mailed, removals with the old batch details and additions with the
//!   new ones.
//! - `batchEnrollOperation`: one learner on an open batch; the outcome is
//!   replied to the caller.
//!
//! Bulk and update are fire-and-forget. Their per-recipient failures are
//! logged and published, never returned.

use std::sync::Arc;

use async_trait::async_trait;
use lernia_core::batch::{BatchSnapshot, Roster};
use lernia_core::error::CoreError;
use lernia_core::membership;
use lernia_core::notification::{
    build_recipient, select_template, EventKind, NotificationContext, Recipient, Role, Trigger,
    UserContact,
};
use lernia_core::operation::{keys, operations, OperationEnvelope};
use lernia_core::types::UserId;
use serde_json::{json, Map, Value};

use crate::dispatcher::{DispatchError, DispatchReport, NotificationDispatcher, RecipientFailure};
use crate::handler::{HandlerError, OperationHandler};
use crate::ports::UserDirectory;

const SUPPORTED: &[&str] = &[
    operations::BATCH_BULK_NOTIFICATION,
    operations::BATCH_UPDATE_NOTIFICATION,
    operations::BATCH_ENROLL_OPERATION,
];

pub struct BatchNotificationHandler {
    users: Arc<dyn UserDirectory>,
    dispatcher: NotificationDispatcher,
}

impl BatchNotificationHandler {
    pub fn new(users: Arc<dyn UserDirectory>, dispatcher: NotificationDispatcher) -> Self {
        Self { users, dispatcher }
    }

    /// Mail every current mentor and active participant of a batch.
    pub async fn notify_bulk(
        &self,
        batch: &BatchSnapshot,
        kind: EventKind,
    ) -> Result<DispatchReport, HandlerError> {
        let context = NotificationContext::for_batch(batch);
        self.fan_out(&Roster::from_batch(batch), kind, Trigger::Invite, &context)
            .await
    }

    /// Mail the membership changes between two snapshots of one batch.
    pub async fn notify_update(
        &self,
        previous: &BatchSnapshot,
        next: &BatchSnapshot,
    ) -> Result<DispatchReport, HandlerError> {
        let delta = membership::diff(previous, next);
        if delta.is_empty() {
            tracing::debug!("No membership change, nothing to notify");
            return Ok(DispatchReport::default());
        }

        tracing::info!(
            removed_mentors = delta.removed_mentors.len(),
            added_mentors = delta.added_mentors.len(),
            removed_participants = delta.removed_participants.len(),
            added_participants = delta.added_participants.len(),
            "Batch membership changed"
        );

        let mut report = self
            .fan_out(
                &delta.removals(),
                EventKind::Remove,
                Trigger::Invite,
                &NotificationContext::for_batch(previous),
            )
            .await?;

        let additions = self
            .fan_out(
                &delta.additions(),
                EventKind::Add,
                Trigger::Invite,
                &NotificationContext::for_batch(next),
            )
            .await;
        match additions {
            Ok(added) => report.merge(added),
            Err(HandlerError::Dispatch(err)) => return Err(err.after(report).into()),
            Err(err) => return Err(err),
        }

        Ok(report)
    }

    /// Mail one learner who enrolled on, or left, an open batch.
    ///
    /// Returns whether the mail was handed to the transport. Unknown or
    /// blank template names are the caller's problem and come back as
    /// [`HandlerError::Client`].
    pub async fn notify_enrollment(
        &self,
        user_id: &str,
        batch: &BatchSnapshot,
        kind: EventKind,
    ) -> Result<bool, HandlerError> {
        let ids = vec![user_id.to_string()];
        let Some(contact) = self.users.find_contacts(&ids).await?.into_iter().next() else {
            tracing::warn!(user_id, "Enrolled user not found, no notification sent");
            return Ok(false);
        };

        let recipient = build_recipient(&contact, kind, Role::Participant, Trigger::OpenEnrollment)?;
        let context = NotificationContext::for_batch(batch);

        match self.dispatcher.deliver(&recipient, &context).await {
            Ok(()) => Ok(true),
            Err(RecipientFailure::Template(err)) => Err(HandlerError::Client(err)),
            Err(failure) if failure.is_fatal() => {
                Err(DispatchError::template_store(failure.to_string()).into())
            }
            Err(_) => Ok(false),
        }
    }

    /// Look up, address and mail everyone on `roster`, mentors first.
    async fn fan_out(
        &self,
        roster: &Roster,
        kind: EventKind,
        trigger: Trigger,
        context: &NotificationContext,
    ) -> Result<DispatchReport, HandlerError> {
        let mut report = DispatchReport::default();
        if roster.is_empty() {
            return Ok(report);
        }

        for (role, ids) in [
            (Role::Mentor, &roster.mentors),
            (Role::Participant, &roster.participants),
        ] {
            if ids.is_empty() {
                continue;
            }

            let contacts = self.users.find_contacts(ids).await?;
            let recipients = self.recipients(&contacts, kind, role, trigger, &mut report);
            match self.dispatcher.dispatch(&recipients, context).await {
                Ok(dispatched) => report.merge(dispatched),
                Err(err) => {
                    let err = err.after(report);
                    tracing::error!(
                        kind = kind.as_str(),
                        sent = err.partial().sent(),
                        error = %err,
                        "Batch notification fan-out aborted"
                    );
                    return Err(err.into());
                }
            }
        }

        tracing::info!(
            kind = kind.as_str(),
            recipients = roster.len(),
            sent = report.sent(),
            failed = report.failed(),
            "Batch notification fan-out finished"
        );

        Ok(report)
    }

    fn recipients(
        &self,
        contacts: &[UserContact],
        kind: EventKind,
        role: Role,
        trigger: Trigger,
        report: &mut DispatchReport,
    ) -> Vec<Recipient> {
        contacts
            .iter()
            .filter_map(|contact| match build_recipient(contact, kind, role, trigger) {
                Ok(recipient) => Some(recipient),
                Err(err) => {
                    tracing::error!(
                        user_id = %contact.id,
                        role = role.as_str(),
                        error = %err,
                        "User record cannot be notified"
                    );
                    report.record_invalid_contact(
                        contact.id.clone(),
                        select_template(trigger, kind, role),
                        err,
                    );
                    None
                }
            })
            .collect()
    }
}

#[async_trait]
impl OperationHandler for BatchNotificationHandler {
    fn name(&self) -> &'static str {
        "batch_notification"
    }

    fn operations(&self) -> &'static [&'static str] {
        SUPPORTED
    }

    async fn handle(&self, envelope: &OperationEnvelope) -> Result<Option<Value>, HandlerError> {
        match envelope.operation.as_str() {
            operations::BATCH_BULK_NOTIFICATION => {
                let batch: BatchSnapshot = envelope.get(keys::COURSE_BATCH)?;
                let kind = envelope.get_str(keys::OPERATION_TYPE)?.parse::<EventKind>()?;
                self.notify_bulk(&batch, kind).await?;
                Ok(None)
            }
            operations::BATCH_UPDATE_NOTIFICATION => {
                let previous: BatchSnapshot = envelope.get(keys::OLD)?;
                let next: BatchSnapshot = envelope.get(keys::NEW)?;
                self.notify_update(&previous, &next).await?;
                Ok(None)
            }
            operations::BATCH_ENROLL_OPERATION => {
                let user_id = enrolled_user(envelope)?;
                let batch: BatchSnapshot = envelope.get(keys::COURSE_BATCH)?;
                let kind = envelope.get_str(keys::OPERATION_TYPE)?.parse::<EventKind>()?;
                let delivered = self.notify_enrollment(&user_id, &batch, kind).await?;
                Ok(Some(json!({ "userId": user_id, "delivered": delivered })))
            }
            other => Err(HandlerError::Unsupported(other.to_string())),
        }
    }
}

/// The enrolled user: `courseMap.userId`, falling back to a top-level `userId`.
fn enrolled_user(envelope: &OperationEnvelope) -> Result<UserId, CoreError> {
    if let Some(course_map) = envelope
        .payload
        .get(keys::COURSE_MAP)
        .filter(|v| !v.is_null())
    {
        let course_map: Map<String, Value> = serde_json::from_value(course_map.clone())
            .map_err(|e| CoreError::Validation(format!("Invalid {}: {e}", keys::COURSE_MAP)))?;
        if let Some(Value::String(id)) = course_map.get(keys::USER_ID) {
            if !id.trim().is_empty() {
                return Ok(id.clone());
            }
        }
    }

    envelope.get_str(keys::USER_ID).map(str::to_string)
}
