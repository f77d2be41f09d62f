//! In-memory collaborators for the notification pipeline.
//!
//! Nothing here touches the network or a database; every fake records
//! enough to assert on what the pipeline asked of it.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lernia_core::notification::{templates, NotificationContext, UserContact};
use lernia_core::template;
use lernia_core::types::UserId;
use lernia_events::ports::{
    Decryptor, MailError, MailTransport, StoreError, TemplateError, TemplateResolver,
    UserDirectory,
};
use lernia_events::NotificationDispatcher;

/// Prefix the fake decryptor strips; anything else fails to decrypt.
pub const ENC_PREFIX: &str = "enc:";

pub fn encrypted(email: &str) -> String {
    format!("{ENC_PREFIX}{email}")
}

pub fn contact(id: &str, first_name: &str, email: &str) -> UserContact {
    UserContact {
        id: id.to_string(),
        first_name: Some(first_name.to_string()),
        email: Some(encrypted(email)),
    }
}

/// Address the fakes use for a user id.
pub fn email_of(id: &str) -> String {
    format!("{}@example.com", id.to_lowercase())
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryDirectory {
    contacts: HashMap<UserId, UserContact>,
    pub lookups: Mutex<Vec<Vec<UserId>>>,
    pub unavailable: AtomicBool,
}

impl MemoryDirectory {
    pub fn new(contacts: impl IntoIterator<Item = UserContact>) -> Self {
        Self {
            contacts: contacts.into_iter().map(|c| (c.id.clone(), c)).collect(),
            ..Default::default()
        }
    }

    /// A directory where every id resolves to `<id>@example.com`.
    pub fn with_users(ids: &[&str]) -> Self {
        Self::new(ids.iter().map(|id| contact(id, id, &email_of(id))))
    }

    pub fn lookups(&self) -> Vec<Vec<UserId>> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait]
impl UserDirectory for MemoryDirectory {
    async fn find_contacts(&self, ids: &[UserId]) -> Result<Vec<UserContact>, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        self.lookups.lock().unwrap().push(ids.to_vec());
        Ok(ids
            .iter()
            .filter_map(|id| self.contacts.get(id).cloned())
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

pub struct MemoryTemplates {
    templates: HashMap<String, String>,
    pub unavailable: AtomicBool,
    /// Template names whose lookup fails as if the store were down.
    offline: Mutex<HashSet<String>>,
}

impl MemoryTemplates {
    pub fn new(entries: &[(&str, &str)]) -> Self {
        Self {
            templates: entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            unavailable: AtomicBool::new(false),
            offline: Mutex::default(),
        }
    }

    /// Make lookups of `names` fail with [`TemplateError::Unavailable`].
    pub fn take_offline(&self, names: &[&str]) {
        let mut offline = self.offline.lock().unwrap();
        offline.extend(names.iter().map(|n| n.to_string()));
    }

    /// All six batch templates, each naming itself in the body.
    pub fn standard() -> Self {
        let names = [
            templates::BATCH_MENTOR_ENROL,
            templates::BATCH_MENTOR_UNENROL,
            templates::BATCH_LEARNER_ENROL,
            templates::BATCH_LEARNER_UNENROL,
            templates::OPEN_BATCH_LEARNER_ENROL,
            templates::OPEN_BATCH_LEARNER_UNENROL,
        ];
        Self {
            templates: names
                .iter()
                .map(|n| (n.to_string(), format!("[{n}] Hi $name, ${{batchName}}")))
                .collect(),
            unavailable: AtomicBool::new(false),
            offline: Mutex::default(),
        }
    }
}

#[async_trait]
impl TemplateResolver for MemoryTemplates {
    async fn resolve(&self, name: &str) -> Result<String, TemplateError> {
        if self.unavailable.load(Ordering::SeqCst) || self.offline.lock().unwrap().contains(name) {
            return Err(TemplateError::Unavailable("connection refused".to_string()));
        }
        self.templates
            .get(name)
            .cloned()
            .ok_or_else(|| TemplateError::NotFound(name.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Decryption
// ---------------------------------------------------------------------------

/// Strips [`ENC_PREFIX`]; values without it fail to decrypt.
pub struct PrefixDecryptor;

impl Decryptor for PrefixDecryptor {
    fn decrypt(&self, value: &str) -> Option<String> {
        value.strip_prefix(ENC_PREFIX).map(str::to_string)
    }
}

// ---------------------------------------------------------------------------
// Mail
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SentMail {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    pub context: NotificationContext,
}

/// Records every send attempt; rejects the configured addresses.
#[derive(Default)]
pub struct RecordingMailer {
    reject: HashSet<String>,
    attempts: Mutex<Vec<SentMail>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting(addresses: &[&str]) -> Self {
        Self {
            reject: addresses.iter().map(|a| a.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Every call to `send`, including rejected ones, in call order.
    pub fn attempts(&self) -> Vec<SentMail> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn attempted_addresses(&self) -> Vec<String> {
        self.attempts()
            .into_iter()
            .flat_map(|m| m.to)
            .collect()
    }
}

#[async_trait]
impl MailTransport for RecordingMailer {
    async fn send(
        &self,
        to: &[String],
        subject: &str,
        context: &NotificationContext,
        template: &str,
    ) -> Result<(), MailError> {
        self.attempts.lock().unwrap().push(SentMail {
            to: to.to_vec(),
            subject: subject.to_string(),
            body: template::render(template, context),
            context: context.clone(),
        });

        match to.iter().find(|addr| self.reject.contains(*addr)) {
            Some(addr) => Err(MailError::Rejected(addr.clone())),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

pub struct Fakes {
    pub users: Arc<MemoryDirectory>,
    pub templates: Arc<MemoryTemplates>,
    pub mailer: Arc<RecordingMailer>,
}

impl Fakes {
    pub fn new(users: MemoryDirectory, templates: MemoryTemplates, mailer: RecordingMailer) -> Self {
        Self {
            users: Arc::new(users),
            templates: Arc::new(templates),
            mailer: Arc::new(mailer),
        }
    }

    pub fn dispatcher(&self) -> NotificationDispatcher {
        NotificationDispatcher::new(
            self.templates.clone(),
            Arc::new(PrefixDecryptor),
            self.mailer.clone(),
        )
    }
}
