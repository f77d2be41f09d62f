//! Repository for the `users` table.

use std::collections::HashMap;

use sqlx::PgPool;

use crate::models::user::ContactRow;

/// Column projection used by contact lookups.
const CONTACT_COLUMNS: &str = "id, first_name, email";

/// Read-only lookups of user contact data.
pub struct UserRepo;

impl UserRepo {
    /// Fetch contact rows for `ids`, in the order the ids were given.
    ///
    /// Unknown ids are skipped and duplicate ids yield a single row. An empty
    /// result means none of the users exist.
    pub async fn find_contacts(
        pool: &PgPool,
        ids: &[String],
    ) -> Result<Vec<ContactRow>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let query = format!("SELECT {CONTACT_COLUMNS} FROM users WHERE id = ANY($1)");
        let rows = sqlx::query_as::<_, ContactRow>(&query)
            .bind(ids)
            .fetch_all(pool)
            .await?;

        let mut by_id: HashMap<String, ContactRow> =
            rows.into_iter().map(|row| (row.id.clone(), row)).collect();
        let ordered: Vec<ContactRow> = ids.iter().filter_map(|id| by_id.remove(id)).collect();

        if ordered.len() < ids.len() {
            tracing::debug!(
                requested = ids.len(),
                found = ordered.len(),
                "Some users were not found"
            );
        }

        Ok(ordered)
    }

    /// Insert or replace a user's contact data.
    pub async fn upsert_contact(
        pool: &PgPool,
        id: &str,
        first_name: Option<&str>,
        encrypted_email: Option<&str>,
    ) -> Result<ContactRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO users (id, first_name, email)
             VALUES ($1, $2, $3)
             ON CONFLICT (id) DO UPDATE SET
                first_name = EXCLUDED.first_name,
                email = EXCLUDED.email,
                updated_at = now()
             RETURNING {CONTACT_COLUMNS}"
        );
        sqlx::query_as::<_, ContactRow>(&query)
            .bind(id)
            .bind(first_name)
            .bind(encrypted_email)
            .fetch_one(pool)
            .await
    }
}
