//! Notification assembly: template selection, subjects, recipients and the
//! shared template context.
//!
//! These are pure functions of their inputs; the dispatcher in
//! `lernia-events` owns all I/O.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::batch::BatchSnapshot;
use crate::error::CoreError;
use crate::types::UserId;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Template names as stored in the email template table.
pub mod templates {
    pub const BATCH_MENTOR_ENROL: &str = "batchMentorEnrol";
    pub const BATCH_MENTOR_UNENROL: &str = "batchMentorUnenrol";
    pub const BATCH_LEARNER_ENROL: &str = "batchLearnerEnrol";
    pub const BATCH_LEARNER_UNENROL: &str = "batchLearnerUnenrol";
    pub const OPEN_BATCH_LEARNER_ENROL: &str = "openBatchLearnerEnrol";
    pub const OPEN_BATCH_LEARNER_UNENROL: &str = "openBatchLearnerUnenrol";
}

/// Keys of the template context.
pub mod context_keys {
    pub const BATCH_NAME: &str = "batchName";
    pub const COURSE_NAME: &str = "courseName";
    pub const COURSE_LOGO_URL: &str = "courseLogoUrl";
    pub const ORG_NAME: &str = "orgName";
    pub const BATCH_START_DATE: &str = "batchStartDate";
    pub const BATCH_END_DATE: &str = "batchEndDate";
    /// Recipient first name.
    pub const NAME: &str = "name";
}

pub const SUBJECT_COURSE_INVITATION: &str = "course invitation";
pub const SUBJECT_UNENROLLED: &str = "unenrolled from course batch";

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Direction of a membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Add,
    Remove,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Add => "add",
            EventKind::Remove => "remove",
        }
    }

    /// Subject line; depends on the direction only.
    pub fn subject(&self) -> &'static str {
        match self {
            EventKind::Add => SUBJECT_COURSE_INVITATION,
            EventKind::Remove => SUBJECT_UNENROLLED,
        }
    }
}

impl FromStr for EventKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("add") {
            Ok(EventKind::Add)
        } else if s.eq_ignore_ascii_case("remove") {
            Ok(EventKind::Remove)
        } else {
            Err(CoreError::InvalidParameterValue {
                value: s.to_string(),
                kind: "operationType",
            })
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Mentor,
    Participant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Mentor => "mentor",
            Role::Participant => "participant",
        }
    }
}

/// What caused the membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// An administrator changed an invite-only batch.
    Invite,
    /// A learner enrolled or unenrolled on an open batch.
    OpenEnrollment,
}

/// Pick the email template for a change.
///
/// Open enrolment only ever concerns learners; a mentor reached through
/// that trigger gets the regular mentor template.
pub fn select_template(trigger: Trigger, kind: EventKind, role: Role) -> &'static str {
    use templates::*;

    match (trigger, role, kind) {
        (_, Role::Mentor, EventKind::Add) => BATCH_MENTOR_ENROL,
        (_, Role::Mentor, EventKind::Remove) => BATCH_MENTOR_UNENROL,
        (Trigger::Invite, Role::Participant, EventKind::Add) => BATCH_LEARNER_ENROL,
        (Trigger::Invite, Role::Participant, EventKind::Remove) => BATCH_LEARNER_UNENROL,
        (Trigger::OpenEnrollment, Role::Participant, EventKind::Add) => OPEN_BATCH_LEARNER_ENROL,
        (Trigger::OpenEnrollment, Role::Participant, EventKind::Remove) => {
            OPEN_BATCH_LEARNER_UNENROL
        }
    }
}

// ---------------------------------------------------------------------------
// NotificationContext
// ---------------------------------------------------------------------------

/// Named values substituted into an email template.
///
/// Blank values are never stored, so templates see a missing variable
/// rather than an empty one. The recipient name is the exception: it is
/// always present, defaulting to `""`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct NotificationContext(BTreeMap<String, String>);

impl NotificationContext {
    /// Batch-level fields, shared by every recipient of one event.
    pub fn for_batch(batch: &BatchSnapshot) -> Self {
        let mut ctx = Self::default();
        ctx.insert_non_blank(context_keys::BATCH_NAME, batch.name.as_deref());
        ctx.insert_non_blank(context_keys::COURSE_NAME, batch.course_name());
        ctx.insert_non_blank(context_keys::COURSE_LOGO_URL, batch.course_logo_url());
        ctx.insert_non_blank(context_keys::ORG_NAME, batch.org_name.as_deref());
        ctx.insert_non_blank(context_keys::BATCH_START_DATE, batch.start_date.as_deref());
        ctx.insert_non_blank(context_keys::BATCH_END_DATE, batch.end_date.as_deref());
        ctx
    }

    /// A copy of this context personalised for one recipient.
    pub fn with_first_name(&self, first_name: Option<&str>) -> Self {
        let mut ctx = self.clone();
        let name = first_name.filter(|n| !n.trim().is_empty()).unwrap_or("");
        ctx.0
            .insert(context_keys::NAME.to_string(), name.to_string());
        ctx
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn insert_non_blank(&mut self, key: &str, value: Option<&str>) {
        if let Some(v) = value.filter(|v| !v.trim().is_empty()) {
            self.0.insert(key.to_string(), v.to_string());
        }
    }
}

// ---------------------------------------------------------------------------
// Recipients
// ---------------------------------------------------------------------------

/// Projection of a user row needed to address a notification.
///
/// Fields are optional because the user store is loosely typed; a row
/// missing either field cannot be turned into a [`Recipient`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserContact {
    pub id: UserId,
    pub first_name: Option<String>,
    /// Encrypted email address as stored at rest.
    pub email: Option<String>,
}

/// One addressee of a notification, ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub user_id: UserId,
    pub first_name: String,
    /// Still encrypted; decrypted by the dispatcher right before sending.
    pub encrypted_email: String,
    pub role: Role,
    pub subject: &'static str,
    pub template_name: &'static str,
}

/// Build a recipient from a user row.
///
/// The row must carry both `firstName` and `email`; the user lookup is
/// expected to have projected exactly those columns.
pub fn build_recipient(
    contact: &UserContact,
    kind: EventKind,
    role: Role,
    trigger: Trigger,
) -> Result<Recipient, CoreError> {
    let first_name = contact
        .first_name
        .clone()
        .ok_or(CoreError::MissingField("firstName"))?;
    let encrypted_email = contact
        .email
        .clone()
        .ok_or(CoreError::MissingField("email"))?;

    Ok(Recipient {
        user_id: contact.id.clone(),
        first_name,
        encrypted_email,
        role,
        subject: kind.subject(),
        template_name: select_template(trigger, kind, role),
    })
}
