//! Postgres-backed implementations of the pipeline's lookup ports.

use async_trait::async_trait;
use lernia_core::notification::UserContact;
use lernia_core::types::UserId;
use lernia_db::repositories::{EmailTemplateRepo, UserRepo};
use lernia_db::DbPool;

use crate::ports::{StoreError, TemplateError, TemplateResolver, UserDirectory};

/// User contact lookups against the `users` table.
#[derive(Clone)]
pub struct PgUserDirectory {
    pool: DbPool,
}

impl PgUserDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_contacts(&self, ids: &[UserId]) -> Result<Vec<UserContact>, StoreError> {
        let rows = UserRepo::find_contacts(&self.pool, ids).await?;
        if rows.is_empty() && !ids.is_empty() {
            tracing::warn!(requested = ids.len(), "No user data found for notification");
        }
        Ok(rows.into_iter().map(UserContact::from).collect())
    }
}

/// Email templates stored in the `email_templates` table.
#[derive(Clone)]
pub struct PgTemplateStore {
    pool: DbPool,
}

impl PgTemplateStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TemplateResolver for PgTemplateStore {
    async fn resolve(&self, name: &str) -> Result<String, TemplateError> {
        match EmailTemplateRepo::find_by_name(&self.pool, name).await {
            Ok(Some(row)) => Ok(row.template),
            Ok(None) => Err(TemplateError::NotFound(name.to_string())),
            Err(e) => Err(TemplateError::Unavailable(e.to_string())),
        }
    }
}
