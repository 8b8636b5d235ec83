//! Immutable mail description handed in by the mail-source adapter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::text;

/// One attachment as observed on a mail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentData {
    /// Position of the attachment within the mail, starting at 0.
    pub position: usize,
    pub filename: String,
    pub size_bytes: u64,
}

impl AttachmentData {
    pub fn extension(&self) -> String {
        self.filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default()
    }
}

/// Everything the engine reads about one mail. Built by the adapter; never
/// mutated by the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailSnapshot {
    pub entry_id: String,
    #[serde(default)]
    pub store_id: String,
    pub conversation_id: String,
    /// Normalised (angle brackets stripped); may be empty on partial metadata.
    #[serde(default)]
    pub internet_message_id: String,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub subject: String,
    /// Normalised participant set, upper-cased.
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub body_fingerprint: String,
    /// Opaque base64 thread-position token.
    #[serde(default)]
    pub thread_index: String,
    /// Normalised ids from In-Reply-To / References / transport headers.
    #[serde(default)]
    pub reference_message_ids: Vec<String>,
    pub received_on: DateTime<Utc>,
    /// Subject lines mined from quoted sections of the body.
    #[serde(default)]
    pub historical_subjects: Vec<String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentData>,
}

impl MailSnapshot {
    /// Normalised form of the snapshot subject.
    pub fn normalized_subject(&self) -> String {
        text::normalize_subject(&self.subject)
    }

    /// Root anchor of the thread-index (44-char base64 prefix).
    pub fn thread_root(&self) -> &str {
        text::thread_root(&self.thread_index)
    }

    /// Base64 of the first 27 decoded thread-index bytes.
    pub fn thread_index_prefix(&self) -> String {
        text::thread_index_prefix(&self.thread_index)
    }

    pub fn has_message_id(&self) -> bool {
        !self.internet_message_id.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_extension() {
        let att = AttachmentData {
            position: 0,
            filename: "Packing List.PDF".to_string(),
            size_bytes: 10,
        };
        assert_eq!(att.extension(), "pdf");

        let bare = AttachmentData {
            position: 1,
            filename: "README".to_string(),
            size_bytes: 1,
        };
        assert_eq!(bare.extension(), "");
    }

    #[test]
    fn test_normalized_subject() {
        let snap = MailSnapshot {
            subject: "RE: Quote for PO-123".to_string(),
            ..Default::default()
        };
        assert_eq!(snap.normalized_subject(), "Quote for PO-123");
    }
}
