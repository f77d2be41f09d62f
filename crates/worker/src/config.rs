use std::fmt;

use lernia_events::delivery::email::EmailConfig;

/// Router identity used when `ROUTER_NAME` is not set.
pub const DEFAULT_ROUTER_NAME: &str = "BackgroundRequestRouter";

/// Worker tasks per handler pool when `NOTIFICATION_WORKERS` is not set.
pub const DEFAULT_WORKERS: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Log output format, from `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Worker configuration loaded from environment variables.
#[derive(Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    /// Identity of this process's operation router; fixed for its lifetime.
    pub router_name: String,
    pub workers: usize,
    /// Secret from which the contact decryption key is derived.
    pub encryption_key: String,
    pub log_format: LogFormat,
    /// `None` when SMTP is not configured; mail is then only logged.
    pub email: Option<EmailConfig>,
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                  | Default                   |
    /// |--------------------------|---------------------------|
    /// | `DATABASE_URL`           | required                  |
    /// | `CONTACT_ENCRYPTION_KEY` | required                  |
    /// | `ROUTER_NAME`            | `BackgroundRequestRouter` |
    /// | `NOTIFICATION_WORKERS`   | `4`                       |
    /// | `LOG_FORMAT`             | `text`                    |
    /// | `SMTP_*`                 | see [`EmailConfig`]       |
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = required("DATABASE_URL")?;
        let encryption_key = required("CONTACT_ENCRYPTION_KEY")?;

        let router_name = optional("ROUTER_NAME").unwrap_or_else(|| DEFAULT_ROUTER_NAME.to_string());

        let workers = match optional("NOTIFICATION_WORKERS") {
            None => DEFAULT_WORKERS,
            Some(raw) => match raw.parse::<usize>() {
                Ok(0) => return Err(invalid("NOTIFICATION_WORKERS", raw, "must be at least 1")),
                Ok(n) => n,
                Err(e) => return Err(invalid("NOTIFICATION_WORKERS", raw, e)),
            },
        };

        let log_format = match optional("LOG_FORMAT").as_deref().map(str::to_ascii_lowercase) {
            None => LogFormat::Text,
            Some(f) if f == "text" => LogFormat::Text,
            Some(f) if f == "json" => LogFormat::Json,
            Some(other) => return Err(invalid("LOG_FORMAT", other, "expected 'text' or 'json'")),
        };

        Ok(Self {
            database_url,
            router_name,
            workers,
            encryption_key,
            log_format,
            email: EmailConfig::from_env(),
        })
    }
}

impl fmt::Debug for WorkerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerConfig")
            .field("router_name", &self.router_name)
            .field("workers", &self.workers)
            .field("log_format", &self.log_format)
            .field("smtp", &self.email.as_ref().map(|e| e.smtp_host.as_str()))
            .finish_non_exhaustive()
    }
}

fn optional(var: &'static str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    optional(var).ok_or(ConfigError::Missing(var))
}

fn invalid(var: &'static str, value: String, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        var,
        value,
        reason: reason.to_string(),
    }
}
