//! Email template entity model.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// A row from the `email_templates` table.
#[derive(Debug, Clone, FromRow)]
pub struct EmailTemplate {
    pub name: String,
    pub template: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
