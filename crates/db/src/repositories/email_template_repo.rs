//! Repository for the `email_templates` table.

use sqlx::PgPool;

use crate::models::email_template::EmailTemplate;

const COLUMNS: &str = "name, template, created_at, updated_at";

pub struct EmailTemplateRepo;

impl EmailTemplateRepo {
    /// Find a template by its exact name.
    pub async fn find_by_name(
        pool: &PgPool,
        name: &str,
    ) -> Result<Option<EmailTemplate>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM email_templates WHERE name = $1");
        sqlx::query_as::<_, EmailTemplate>(&query)
            .bind(name)
            .fetch_optional(pool)
            .await
    }

    /// Insert or replace a template body.
    pub async fn upsert(
        pool: &PgPool,
        name: &str,
        template: &str,
    ) -> Result<EmailTemplate, sqlx::Error> {
        let query = format!(
            "INSERT INTO email_templates (name, template)
             VALUES ($1, $2)
             ON CONFLICT (name) DO UPDATE SET
                template = EXCLUDED.template,
                updated_at = now()
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, EmailTemplate>(&query)
            .bind(name)
            .bind(template)
            .fetch_one(pool)
            .await
    }
}
