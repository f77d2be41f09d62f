//! User contact projection read by the notification pipeline.

use lernia_core::notification::UserContact;
use sqlx::FromRow;

/// `id, first_name, email` projection of a `users` row.
///
/// Both data columns are nullable; rows with gaps are still returned and the
/// caller decides whether they are usable.
#[derive(Debug, Clone, FromRow)]
pub struct ContactRow {
    pub id: String,
    pub first_name: Option<String>,
    pub email: Option<String>,
}

impl From<ContactRow> for UserContact {
    fn from(row: ContactRow) -> Self {
        UserContact {
            id: row.id,
            first_name: row.first_name,
            email: row.email,
        }
    }
}
