//! Event aggregate records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::snapshot::MailSnapshot;
use crate::text;

/// Case-insensitive membership over an insertion-ordered string set.
pub(crate) fn contains_ci(set: &[String], value: &str) -> bool {
    set.iter().any(|entry| entry.eq_ignore_ascii_case(value))
}

/// Inserts preserving order; returns whether the set changed.
pub(crate) fn insert_ci(set: &mut Vec<String>, value: &str) -> bool {
    let value = value.trim();
    if value.is_empty() || contains_ci(set, value) {
        return false;
    }
    set.push(value.to_string());
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Open,
    Archived,
}

/// A mail message associated with an event. Soft-deleted members stay in the
/// list as tombstones.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Email {
    pub entry_id: String,
    #[serde(default)]
    pub store_id: String,
    #[serde(default)]
    pub conversation_id: String,
    #[serde(default)]
    pub internet_message_id: String,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub body_fingerprint: String,
    #[serde(default)]
    pub thread_index: String,
    #[serde(default)]
    pub thread_index_prefix: String,
    #[serde(default)]
    pub reference_message_ids: Vec<String>,
    pub received_on: DateTime<Utc>,
    /// UI highlight flag: content arrived that the user has not acknowledged.
    #[serde(default)]
    pub is_new_or_updated: bool,
    /// Soft-delete marker.
    #[serde(default)]
    pub is_removed: bool,
}

impl Email {
    pub fn from_snapshot(snapshot: &MailSnapshot) -> Self {
        Self {
            entry_id: snapshot.entry_id.clone(),
            store_id: snapshot.store_id.clone(),
            conversation_id: snapshot.conversation_id.clone(),
            internet_message_id: text::normalize_message_id(&snapshot.internet_message_id),
            sender: snapshot.sender.clone(),
            to: snapshot.to.clone(),
            subject: snapshot.subject.clone(),
            participants: snapshot.participants.clone(),
            body_fingerprint: snapshot.body_fingerprint.clone(),
            thread_index: snapshot.thread_index.clone(),
            thread_index_prefix: snapshot.thread_index_prefix(),
            reference_message_ids: snapshot.reference_message_ids.clone(),
            received_on: snapshot.received_on,
            is_new_or_updated: true,
            is_removed: false,
        }
    }

    /// Root anchor of the thread-index (44-char base64 prefix).
    pub fn thread_root(&self) -> &str {
        text::thread_root(&self.thread_index)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// `entry_id:position:filename` — stable per source mail.
    pub id: String,
    pub filename: String,
    #[serde(default)]
    pub extension: String,
    pub size_bytes: u64,
    pub source_mail_entry_id: String,
}

impl Attachment {
    pub fn from_snapshot(snapshot: &MailSnapshot) -> Vec<Attachment> {
        snapshot
            .attachments
            .iter()
            .map(|att| Attachment {
                id: format!("{}:{}:{}", snapshot.entry_id, att.position, att.filename),
                filename: att.filename.clone(),
                extension: att.extension(),
                size_bytes: att.size_bytes,
                source_mail_entry_id: snapshot.entry_id.clone(),
            })
            .collect()
    }
}

/// External extraction output attached to an event; opaque to the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardItem {
    pub key: String,
    pub value: String,
}

/// The aggregate business object grouping related mails.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    pub status: EventStatus,
    #[serde(default)]
    pub priority: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub conversation_ids: Vec<String>,
    #[serde(default)]
    pub related_subjects: Vec<String>,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub not_found_message_ids: Vec<String>,
    #[serde(default)]
    pub processed_message_ids: Vec<String>,
    #[serde(default)]
    pub emails: Vec<Email>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub dashboard_items: Vec<DashboardItem>,
    #[serde(default)]
    pub display_column_source: String,
    #[serde(default)]
    pub display_column_custom: String,
    #[serde(default)]
    pub additional_files: Vec<String>,
}

impl Event {
    /// Members that are not soft-deleted.
    pub fn active_emails(&self) -> impl Iterator<Item = &Email> {
        self.emails.iter().filter(|e| !e.is_removed)
    }

    /// Subject of the first member, tombstoned or not.
    pub fn first_email_subject(&self) -> Option<&str> {
        self.emails.first().map(|e| e.subject.as_str())
    }

    pub fn is_open(&self) -> bool {
        self.status == EventStatus::Open
    }

    /// Whether a message-id was acknowledged by the user.
    pub fn is_processed(&self, message_id: &str) -> bool {
        contains_ci(&self.processed_message_ids, message_id)
    }

    /// Every message-id known on active members, including references.
    pub fn known_message_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for email in self.active_emails() {
            insert_ci(&mut ids, &email.internet_message_id);
        }
        ids
    }

    /// Union of reference-message-ids across active members.
    pub fn referenced_message_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for email in self.active_emails() {
            for reference in &email.reference_message_ids {
                insert_ci(&mut ids, reference);
            }
        }
        ids
    }

    /// Earliest received-on across active members.
    pub fn earliest_received(&self) -> Option<DateTime<Utc>> {
        self.active_emails().map(|e| e.received_on).min()
    }

    /// Drops attachments sourced from the given member entry-id.
    pub(crate) fn strip_attachments_of(&mut self, entry_id: &str) {
        self.attachments
            .retain(|a| !a.source_mail_entry_id.eq_ignore_ascii_case(entry_id));
    }
}
