//! Builder patterns for creating test data programmatically.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};

use osem::snapshot::{AttachmentData, MailSnapshot};

/// Fluent builder for `MailSnapshot` test inputs.
pub struct SnapshotBuilder {
    snapshot: MailSnapshot,
}

impl SnapshotBuilder {
    /// A snapshot with sensible defaults: conversation `C1`, a quote-style
    /// subject and one participant pair.
    pub fn new(entry_id: &str) -> Self {
        Self {
            snapshot: MailSnapshot {
                entry_id: entry_id.to_string(),
                store_id: "STORE-1".to_string(),
                conversation_id: "C1".to_string(),
                internet_message_id: format!("<{}@example.test>", entry_id.to_lowercase()),
                sender: "alice@acme".to_string(),
                to: "bob@corp".to_string(),
                subject: "Quote for PO-123".to_string(),
                participants: vec!["ALICE@ACME".to_string(), "BOB@CORP".to_string()],
                body_fingerprint: String::new(),
                thread_index: String::new(),
                reference_message_ids: vec![],
                received_on: Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap(),
                historical_subjects: vec![],
                attachments: vec![],
            },
        }
    }

    pub fn conversation(mut self, conversation_id: &str) -> Self {
        self.snapshot.conversation_id = conversation_id.to_string();
        self
    }

    pub fn subject(mut self, subject: &str) -> Self {
        self.snapshot.subject = subject.to_string();
        self
    }

    pub fn sender(mut self, sender: &str) -> Self {
        self.snapshot.sender = sender.to_string();
        self
    }

    pub fn message_id(mut self, message_id: &str) -> Self {
        self.snapshot.internet_message_id = message_id.to_string();
        self
    }

    pub fn participants(mut self, participants: &[&str]) -> Self {
        self.snapshot.participants = participants.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn received(mut self, received_on: DateTime<Utc>) -> Self {
        self.snapshot.received_on = received_on;
        self
    }

    pub fn received_at(self, y: i32, mo: u32, d: u32, h: u32, mi: u32) -> Self {
        self.received(Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap())
    }

    pub fn fingerprint(mut self, fingerprint: &str) -> Self {
        self.snapshot.body_fingerprint = fingerprint.to_string();
        self
    }

    pub fn thread_index(mut self, thread_index: &str) -> Self {
        self.snapshot.thread_index = thread_index.to_string();
        self
    }

    pub fn references(mut self, ids: &[&str]) -> Self {
        self.snapshot.reference_message_ids = ids.iter().map(|i| i.to_string()).collect();
        self
    }

    pub fn historical(mut self, subjects: &[&str]) -> Self {
        self.snapshot.historical_subjects = subjects.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn attachment(mut self, filename: &str, size_bytes: u64) -> Self {
        let position = self.snapshot.attachments.len();
        self.snapshot.attachments.push(AttachmentData {
            position,
            filename: filename.to_string(),
            size_bytes,
        });
        self
    }

    pub fn build(self) -> MailSnapshot {
        self.snapshot
    }
}
