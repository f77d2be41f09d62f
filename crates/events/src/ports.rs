//! Collaborator interfaces consumed by the notification pipeline.
//!
//! Production implementations live in [`crate::store`] and
//! [`crate::delivery`]; tests substitute in-memory fakes.

use async_trait::async_trait;
use lernia_core::notification::{NotificationContext, UserContact};
use lernia_core::types::UserId;

pub use crate::delivery::email::MailError;

// ---------------------------------------------------------------------------
// User lookup
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Key-by-id lookup of user contact rows.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Contacts for `ids`, in request order; unknown ids are skipped.
    async fn find_contacts(&self, ids: &[UserId]) -> Result<Vec<UserContact>, StoreError>;
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    /// No template with that name; a data problem, not an outage.
    #[error("Email template not found: {0}")]
    NotFound(String),

    #[error("Template store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait TemplateResolver: Send + Sync {
    async fn resolve(&self, name: &str) -> Result<String, TemplateError>;
}

// ---------------------------------------------------------------------------
// Decryption
// ---------------------------------------------------------------------------

/// Decrypts contact data stored at rest.
///
/// Returns `None` when the value cannot be decrypted; never panics.
pub trait Decryptor: Send + Sync {
    fn decrypt(&self, value: &str) -> Option<String>;
}

// ---------------------------------------------------------------------------
// Mail
// ---------------------------------------------------------------------------

#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Render `template` with `context` and send it to `to`.
    async fn send(
        &self,
        to: &[String],
        subject: &str,
        context: &NotificationContext,
        template: &str,
    ) -> Result<(), MailError>;
}
