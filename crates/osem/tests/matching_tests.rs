//! Classification scenarios for the matching engine through the facade.

mod common;

use common::builders::SnapshotBuilder;
use common::harness::TestHarness;

use chrono::{TimeZone, Utc};

#[test]
fn test_reply_classified_into_event() {
    let harness = TestHarness::new();
    let event = harness.seed_event(SnapshotBuilder::new("A").build());

    let reply = SnapshotBuilder::new("B")
        .subject("RE: Quote for PO-123")
        .sender("bob@corp")
        .participants(&["BOB@CORP", "ALICE@ACME"])
        .received_at(2024, 1, 10, 11, 0)
        .build();

    let accepted = harness.ingestor.try_add_mail(&reply, None).unwrap().unwrap();
    assert_eq!(accepted.event_id, event.event_id);
    assert_eq!(accepted.emails.len(), 2);
}

#[test]
fn test_forwarded_and_tagged_subjects_classify() {
    let harness = TestHarness::new();
    let event = harness.seed_event(SnapshotBuilder::new("A").build());

    for (entry, subject) in [
        ("B", "FW: Quote for PO-123"),
        ("C", "RE: FW: [EXT] Quote for PO-123"),
        ("D", "[External] Quote for PO-123"),
    ] {
        let snap = SnapshotBuilder::new(entry)
            .subject(subject)
            .received_at(2024, 1, 11, 9, 0)
            .build();
        let accepted = harness.ingestor.try_add_mail(&snap, None).unwrap();
        assert!(accepted.is_some(), "subject '{subject}' should classify");
    }
    let stored = harness.store.get_by_id(&event.event_id).unwrap();
    assert_eq!(stored.emails.len(), 4);
}

#[test]
fn test_truncated_subject_needs_historical_confirmation() {
    let harness = TestHarness::new();
    let event = harness.seed_event(SnapshotBuilder::new("A").build());

    // The bare truncated prefix alone must be rejected.
    let unconfirmed = SnapshotBuilder::new("C")
        .subject("Quote for")
        .participants(&["ALICE@ACME"])
        .received_at(2024, 1, 10, 12, 0)
        .build();
    assert!(harness
        .ingestor
        .try_add_mail(&unconfirmed, None)
        .unwrap()
        .is_none());
    assert_eq!(
        harness
            .store
            .get_by_id(&event.event_id)
            .unwrap()
            .emails
            .len(),
        1
    );

    // With a historical subject confirming it, the same mail classifies.
    let confirmed = SnapshotBuilder::new("C")
        .subject("Quote for")
        .participants(&["ALICE@ACME"])
        .historical(&["Quote for PO-123"])
        .received_at(2024, 1, 10, 12, 0)
        .build();
    let accepted = harness
        .ingestor
        .try_add_mail(&confirmed, None)
        .unwrap()
        .unwrap();
    assert_eq!(accepted.event_id, event.event_id);
    assert_eq!(accepted.emails.len(), 2);
}

#[test]
fn test_unrelated_mail_rejected() {
    let harness = TestHarness::new();
    let event = harness.seed_event(SnapshotBuilder::new("A").build());

    let unrelated = SnapshotBuilder::new("D")
        .conversation("C9")
        .subject("Invoice INV-9")
        .sender("dan@other")
        .participants(&["DAN@OTHER"])
        .build();

    assert!(harness
        .ingestor
        .try_add_mail(&unrelated, None)
        .unwrap()
        .is_none());
    let stored = harness.store.get_by_id(&event.event_id).unwrap();
    assert_eq!(stored.emails.len(), 1);
}

#[test]
fn test_subject_overlap_without_participants_rejected() {
    let harness = TestHarness::new();
    harness.seed_event(SnapshotBuilder::new("A").build());

    let stranger = SnapshotBuilder::new("E")
        .subject("Quote for PO-123")
        .sender("dan@other")
        .participants(&["DAN@OTHER"])
        .build();
    assert!(harness
        .ingestor
        .try_add_mail(&stranger, None)
        .unwrap()
        .is_none());
}

#[test]
fn test_three_char_prefix_rejected() {
    let harness = TestHarness::new();
    harness.seed_event(SnapshotBuilder::new("A").build());

    let short = SnapshotBuilder::new("F")
        .subject("Quo")
        .participants(&["ALICE@ACME"])
        .build();
    assert!(harness.ingestor.try_add_mail(&short, None).unwrap().is_none());
}

#[test]
fn test_missing_conversation_id_dropped() {
    let harness = TestHarness::new();
    harness.seed_event(SnapshotBuilder::new("A").build());

    let snap = SnapshotBuilder::new("G").conversation("").build();
    assert!(harness.ingestor.try_add_mail(&snap, None).unwrap().is_none());
}

#[test]
fn test_empty_subject_and_participants_dropped() {
    let harness = TestHarness::new();
    harness.seed_event(SnapshotBuilder::new("A").build());

    let snap = SnapshotBuilder::new("H")
        .subject("")
        .participants(&[])
        .build();
    assert!(harness.ingestor.try_add_mail(&snap, None).unwrap().is_none());
}

#[test]
fn test_ambiguous_match_goes_to_most_recently_updated() {
    let harness = TestHarness::new();

    let first = harness.seed_event(SnapshotBuilder::new("A1").build());
    let second = harness.seed_event(
        SnapshotBuilder::new("A2")
            .conversation("C2")
            .received_at(2024, 1, 11, 9, 0)
            .build(),
    );

    // Touch the first event so it becomes the most recently updated.
    let touch = SnapshotBuilder::new("A3")
        .subject("RE: Quote for PO-123")
        .received_at(2024, 1, 12, 9, 0)
        .build();
    harness
        .ingestor
        .add_mail_to_event(&first.event_id, &touch)
        .unwrap();

    let reply = SnapshotBuilder::new("B")
        .conversation("C3")
        .subject("RE: Quote for PO-123")
        .received_at(2024, 1, 12, 10, 0)
        .build();
    let accepted = harness.ingestor.try_add_mail(&reply, None).unwrap().unwrap();
    assert_eq!(accepted.event_id, first.event_id);
    assert_ne!(accepted.event_id, second.event_id);
}

#[test]
fn test_preferred_event_bias() {
    let harness = TestHarness::new();

    let first = harness.seed_event(SnapshotBuilder::new("A1").build());
    let second = harness.seed_event(
        SnapshotBuilder::new("A2")
            .conversation("C2")
            .received_at(2024, 1, 11, 9, 0)
            .build(),
    );
    // Recency favours the second event; preference overrides it.
    let reply = SnapshotBuilder::new("B")
        .conversation("C3")
        .subject("RE: Quote for PO-123")
        .received_at(2024, 1, 12, 10, 0)
        .build();
    let accepted = harness
        .ingestor
        .try_add_mail(&reply, Some(&first.event_id))
        .unwrap()
        .unwrap();
    assert_eq!(accepted.event_id, first.event_id);
    let _ = second;
}

#[test]
fn test_cjk_reply_prefix_classifies() {
    let harness = TestHarness::new();
    let seed = SnapshotBuilder::new("A")
        .subject("报价单 PO-123")
        .build();
    let event = harness.seed_event(seed);

    let reply = SnapshotBuilder::new("B")
        .subject("回复: 报价单 PO-123")
        .received_at(2024, 1, 10, 11, 0)
        .build();
    let accepted = harness.ingestor.try_add_mail(&reply, None).unwrap().unwrap();
    assert_eq!(accepted.event_id, event.event_id);
}

#[test]
fn test_partial_metadata_dedupe_within_window() {
    let harness = TestHarness::new();
    let base = Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap();

    // A mail with neither entry-id nor message-id.
    let partial = SnapshotBuilder::new("")
        .message_id("")
        .received(base)
        .build();
    let event = harness.seed_event(partial.clone());

    // The same mail observed again 20 seconds later.
    let again = SnapshotBuilder::new("")
        .message_id("")
        .received(base + chrono::Duration::seconds(20))
        .build();
    let accepted = harness.ingestor.try_add_mail(&again, None).unwrap().unwrap();
    assert_eq!(accepted.event_id, event.event_id);
    assert_eq!(accepted.emails.len(), 1);
}
