//! Facade-level behaviour: event creation defaults, backfill scheduling and
//! template preferences.

mod common;

use common::builders::SnapshotBuilder;
use common::harness::TestHarness;

#[test]
fn test_create_event_seeds_title_and_sets() {
    let harness = TestHarness::new();
    let snap = SnapshotBuilder::new("A")
        .subject("RE: Quote for PO-123")
        .historical(&["FW: Booking 7788"])
        .attachment("quote.pdf", 512)
        .build();

    let event = harness.ingestor.create_event_from_mail(&snap, None);
    assert_eq!(event.title, "Quote for PO-123");
    assert!(event.related_subjects.iter().any(|s| s == "Quote for PO-123"));
    assert!(event.related_subjects.iter().any(|s| s == "Booking 7788"));
    assert_eq!(event.attachments.len(), 1);
    assert_eq!(event.priority, 0);
    assert!(event.is_open());
}

#[test]
fn test_create_event_schedules_history_backfill() {
    let harness = TestHarness::new();
    let event = harness
        .ingestor
        .create_event_from_mail(&SnapshotBuilder::new("A").build(), None);

    assert!(harness.catchup.is_tracked(&event.event_id, "C1"));
    assert_eq!(harness.catchup.queue_len(), 1);
}

#[test]
fn test_create_event_defaults_template_from_preferences() {
    let harness = TestHarness::new();
    harness.prefs.set("alice@acme", "tpl-logistics").unwrap();

    let event = harness
        .ingestor
        .create_event_from_mail(&SnapshotBuilder::new("A").build(), None);
    assert_eq!(event.template_id.as_deref(), Some("tpl-logistics"));

    // An explicit template wins over the preference.
    let explicit = harness.ingestor.create_event_from_mail(
        &SnapshotBuilder::new("B").conversation("C2").build(),
        Some("tpl-explicit".to_string()),
    );
    assert_eq!(explicit.template_id.as_deref(), Some("tpl-explicit"));
}

#[test]
fn test_create_event_without_preference_has_no_template() {
    let harness = TestHarness::new();
    let event = harness
        .ingestor
        .create_event_from_mail(&SnapshotBuilder::new("A").build(), None);
    assert!(event.template_id.is_none());
}

#[test]
fn test_empty_subject_titled_placeholder() {
    let harness = TestHarness::new();
    let event = harness
        .ingestor
        .create_event_from_mail(&SnapshotBuilder::new("A").subject("").build(), None);
    assert_eq!(event.title, "(no subject)");
}

#[test]
fn test_try_add_mail_never_creates_events() {
    let harness = TestHarness::new();
    let accepted = harness
        .ingestor
        .try_add_mail(&SnapshotBuilder::new("A").build(), None)
        .unwrap();
    assert!(accepted.is_none());
    assert!(harness.store.list_all().is_empty());
}

#[test]
fn test_event_id_format_and_uniqueness() {
    let harness = TestHarness::new();
    let a = harness
        .ingestor
        .create_event_from_mail(&SnapshotBuilder::new("A").build(), None);
    let b = harness.ingestor.create_event_from_mail(
        &SnapshotBuilder::new("B").conversation("C2").build(),
        None,
    );

    assert!(a.event_id.starts_with("EVT-"));
    assert!(b.event_id.starts_with("EVT-"));
    assert_ne!(a.event_id, b.event_id);
}
