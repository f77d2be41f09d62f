//! Integration tests for `NotificationDispatcher`.
//!
//! Every collaborator is an in-memory fake; the tests check that each
//! recipient is handled independently and that only an unreachable
//! template store stops a dispatch.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use assert_matches::assert_matches;
use common::{contact, email_of, Fakes, MemoryDirectory, MemoryTemplates, RecordingMailer};
use lernia_core::error::CoreError;
use lernia_core::notification::{
    build_recipient, context_keys, templates, EventKind, NotificationContext, Recipient, Role,
    Trigger, UserContact,
};
use lernia_events::dispatcher::{DeliveryStage, DeliveryStatus, DispatchError, RecipientFailure};
use lernia_events::{NotificationEvent, TelemetryBus};

fn recipient(id: &str, kind: EventKind, role: Role) -> Recipient {
    build_recipient(&contact(id, id, &email_of(id)), kind, role, Trigger::Invite).unwrap()
}

fn participants(ids: &[&str]) -> Vec<Recipient> {
    ids.iter()
        .map(|id| recipient(id, EventKind::Add, Role::Participant))
        .collect()
}

fn batch_context() -> NotificationContext {
    let batch = serde_json::from_value(serde_json::json!({
        "name": "Rust 101",
        "startDate": "2026-11-01",
        "courseAdditionalInfo": { "courseName": "Systems Programming" }
    }))
    .unwrap();
    NotificationContext::for_batch(&batch)
}

fn fakes(mailer: RecordingMailer) -> Fakes {
    Fakes::new(MemoryDirectory::default(), MemoryTemplates::standard(), mailer)
}

// ---------------------------------------------------------------------------
// Test: every recipient gets one personalised mail
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sends_one_mail_per_recipient_in_order() {
    let fakes = fakes(RecordingMailer::new());
    let dispatcher = fakes.dispatcher();

    let report = dispatcher
        .dispatch(&participants(&["U1", "U2", "U3"]), &batch_context())
        .await
        .unwrap();

    assert_eq!(report.sent(), 3);
    assert!(report.is_clean());

    let attempts = fakes.mailer.attempts();
    assert_eq!(
        fakes.mailer.attempted_addresses(),
        vec![email_of("U1"), email_of("U2"), email_of("U3")]
    );
    assert!(attempts.iter().all(|m| m.to.len() == 1));
    assert!(attempts.iter().all(|m| m.subject == "course invitation"));
    assert_eq!(attempts[1].body, "[batchLearnerEnrol] Hi U2, Rust 101");
    assert_eq!(attempts[1].context.get(context_keys::NAME), Some("U2"));
    assert_eq!(
        attempts[1].context.get(context_keys::COURSE_NAME),
        Some("Systems Programming")
    );
}

// ---------------------------------------------------------------------------
// Test: the shared context is not modified by personalisation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shared_context_is_left_untouched() {
    let fakes = fakes(RecordingMailer::new());
    let context = batch_context();
    let before = context.clone();

    fakes
        .dispatcher()
        .dispatch(&participants(&["U1"]), &context)
        .await
        .unwrap();

    assert_eq!(context, before);
    assert!(!context.contains(context_keys::NAME));
}

// ---------------------------------------------------------------------------
// Test: a blank decrypted email skips that recipient only
// ---------------------------------------------------------------------------

#[tokio::test]
async fn blank_decryption_skips_only_that_recipient() {
    let fakes = fakes(RecordingMailer::new());
    let mut recipients = participants(&["U1", "U2", "U3"]);
    recipients[1].encrypted_email = common::encrypted("   ");

    let report = fakes
        .dispatcher()
        .dispatch(&recipients, &batch_context())
        .await
        .unwrap();

    assert_eq!(report.sent(), 2);
    assert_eq!(report.failed(), 1);
    assert_eq!(
        fakes.mailer.attempted_addresses(),
        vec![email_of("U1"), email_of("U3")]
    );

    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "U2");
    assert_matches!(failures[0].1, RecipientFailure::BlankEmail);
    assert_eq!(failures[0].1.stage(), DeliveryStage::Decryption);
}

#[tokio::test]
async fn undecryptable_email_never_reaches_transport() {
    let fakes = fakes(RecordingMailer::new());
    let mut recipients = participants(&["U1", "U2"]);
    recipients[0].encrypted_email = "garbage".to_string();

    let report = fakes
        .dispatcher()
        .dispatch(&recipients, &batch_context())
        .await
        .unwrap();

    assert_eq!(fakes.mailer.attempted_addresses(), vec![email_of("U2")]);
    assert_matches!(
        report.outcomes[0].status,
        DeliveryStatus::Failed(RecipientFailure::BlankEmail)
    );
    assert_matches!(report.outcomes[1].status, DeliveryStatus::Sent);
}

// ---------------------------------------------------------------------------
// Test: a transport failure for k still attempts k+1..N
// ---------------------------------------------------------------------------

#[tokio::test]
async fn transport_failure_is_isolated_and_recorded_once() {
    let fakes = fakes(RecordingMailer::rejecting(&[&email_of("U2")]));

    let report = fakes
        .dispatcher()
        .dispatch(&participants(&["U1", "U2", "U3", "U4"]), &batch_context())
        .await
        .unwrap();

    assert_eq!(
        fakes.mailer.attempted_addresses(),
        vec![email_of("U1"), email_of("U2"), email_of("U3"), email_of("U4")]
    );
    assert_eq!(report.outcomes.len(), 4);
    assert_eq!(report.sent(), 3);

    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "U2");
    assert_eq!(failures[0].1.stage(), DeliveryStage::Transport);
}

// ---------------------------------------------------------------------------
// Test: unknown template fails that recipient as a client error
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_template_is_an_invalid_parameter_for_that_recipient() {
    let templates = MemoryTemplates::new(&[(templates::BATCH_LEARNER_ENROL, "Hi $name")]);
    let fakes = Fakes::new(MemoryDirectory::default(), templates, RecordingMailer::new());

    let recipients = vec![
        recipient("M1", EventKind::Add, Role::Mentor),
        recipient("U1", EventKind::Add, Role::Participant),
    ];

    let report = fakes
        .dispatcher()
        .dispatch(&recipients, &batch_context())
        .await
        .unwrap();

    assert_eq!(fakes.mailer.attempted_addresses(), vec![email_of("U1")]);
    assert_matches!(
        &report.outcomes[0].status,
        DeliveryStatus::Failed(RecipientFailure::Template(CoreError::InvalidParameterValue { value, kind }))
            if value == templates::BATCH_MENTOR_ENROL && *kind == "emailTemplateType"
    );

    let (_, failure) = report.failures().next().unwrap();
    assert_matches!(failure, RecipientFailure::Template(err) if err.code() == "invalidParameterValue");
}

#[tokio::test]
async fn blank_template_body_is_rejected() {
    let templates = MemoryTemplates::new(&[(templates::BATCH_LEARNER_ENROL, "  \n")]);
    let fakes = Fakes::new(MemoryDirectory::default(), templates, RecordingMailer::new());

    let report = fakes
        .dispatcher()
        .dispatch(&participants(&["U1"]), &batch_context())
        .await
        .unwrap();

    assert!(fakes.mailer.attempts().is_empty());
    assert_eq!(report.failed(), 1);
    assert_eq!(
        report.failures().next().unwrap().1.stage(),
        DeliveryStage::TemplateResolution
    );
}

// ---------------------------------------------------------------------------
// Test: an unreachable template store aborts the dispatch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unavailable_template_store_aborts_dispatch() {
    let fakes = fakes(RecordingMailer::new());
    fakes.templates.unavailable.store(true, Ordering::SeqCst);

    let result = fakes
        .dispatcher()
        .dispatch(&participants(&["U1", "U2"]), &batch_context())
        .await;

    assert_matches!(result, Err(DispatchError::TemplateStore { .. }));
    assert!(result.unwrap_err().partial().outcomes.is_empty());
    assert!(fakes.mailer.attempts().is_empty());
}

#[tokio::test]
async fn aborted_dispatch_keeps_outcomes_of_recipients_already_mailed() {
    let fakes = fakes(RecordingMailer::new());
    fakes.templates.take_offline(&[templates::BATCH_LEARNER_ENROL]);

    let mut recipients = vec![recipient("M1", EventKind::Add, Role::Mentor)];
    recipients.extend(participants(&["U1", "U2"]));

    let err = fakes
        .dispatcher()
        .dispatch(&recipients, &batch_context())
        .await
        .unwrap_err();

    let partial = err.partial();
    assert_eq!(partial.outcomes.len(), 1);
    assert_eq!(partial.outcomes[0].user_id, "M1");
    assert_matches!(partial.outcomes[0].status, DeliveryStatus::Sent);
    assert_eq!(fakes.mailer.attempted_addresses(), vec![email_of("M1")]);
}

// ---------------------------------------------------------------------------
// Test: recipient without a first name still has `name` in the context
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_first_name_defaults_to_empty_string() {
    let fakes = fakes(RecordingMailer::new());
    let contact = UserContact {
        id: "U9".to_string(),
        first_name: Some(String::new()),
        email: Some(common::encrypted("u9@example.com")),
    };
    let recipient =
        build_recipient(&contact, EventKind::Remove, Role::Participant, Trigger::Invite).unwrap();

    fakes
        .dispatcher()
        .dispatch(&[recipient], &batch_context())
        .await
        .unwrap();

    let mail = &fakes.mailer.attempts()[0];
    assert_eq!(mail.subject, "unenrolled from course batch");
    assert_eq!(mail.context.get(context_keys::NAME), Some(""));
    assert_eq!(mail.body, "[batchLearnerUnenrol] Hi , Rust 101");
}

// ---------------------------------------------------------------------------
// Test: outcomes are published on the telemetry bus
// ---------------------------------------------------------------------------

#[tokio::test]
async fn outcomes_are_published_to_telemetry() {
    let fakes = fakes(RecordingMailer::rejecting(&[&email_of("U2")]));
    let bus = Arc::new(TelemetryBus::default());
    let mut rx = bus.subscribe();
    let dispatcher = fakes.dispatcher().with_telemetry(bus.clone());

    dispatcher
        .dispatch(&participants(&["U1", "U2"]), &batch_context())
        .await
        .unwrap();

    let first: NotificationEvent = rx.recv().await.unwrap();
    let second: NotificationEvent = rx.recv().await.unwrap();
    assert_eq!(first.event_type, "notification.sent");
    assert_eq!(first.user_id.as_deref(), Some("U1"));
    assert_eq!(second.event_type, "notification.failed");
    assert_eq!(second.user_id.as_deref(), Some("U2"));
    assert_eq!(second.payload["stage"], "transport");
}
