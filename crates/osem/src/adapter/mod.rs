//! Mail-source abstraction consumed by ingestion and catch-up.
//!
//! The engine never speaks a wire protocol itself; a concrete adapter maps
//! these calls onto its source (MAPI, IMAP `SEARCH`, JMAP filter objects).
//! Adapter objects are only ever called from background threads with the
//! store lock released.

pub mod filter;
pub mod sync;

use chrono::{DateTime, Utc};

pub use filter::FilterExpr;
pub use sync::SyncState;

use crate::error::AdapterError;
use crate::snapshot::MailSnapshot;

/// Folders the catch-up engine restricts its queries to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FolderKind {
    /// Inbox, child folders included.
    Inbox,
    Sent,
    Deleted,
}

impl std::fmt::Display for FolderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FolderKind::Inbox => write!(f, "inbox"),
            FolderKind::Sent => write!(f, "sent"),
            FolderKind::Deleted => write!(f, "deleted"),
        }
    }
}

/// One entry reported by conversation enumeration.
#[derive(Debug, Clone)]
pub struct ConversationEntry {
    pub entry_id: String,
    pub store_id: String,
}

/// Result of enumerating a conversation from a seed message.
#[derive(Debug, Clone, Default)]
pub struct ConversationScan {
    pub entries: Vec<ConversationEntry>,
    /// Total conversation size when the source can report it.
    pub total_size: Option<usize>,
}

/// The mail-source adapter surface.
pub trait MailSource: Send + Sync {
    /// Resolves one message to a snapshot. `Ok(None)` means the id no longer
    /// exists; errors carry the §AdapterFailed kind.
    fn resolve_by_id(
        &self,
        entry_id: &str,
        store_id: Option<&str>,
    ) -> Result<Option<MailSnapshot>, AdapterError>;

    /// Walks the source's native thread grouping from a seed message.
    fn enumerate_conversation(
        &self,
        seed_entry_id: &str,
        conversation_id: &str,
        since: DateTime<Utc>,
    ) -> Result<ConversationScan, AdapterError>;

    /// Restricted folder query. Returns matching entry-ids.
    fn restrict_folder(
        &self,
        folder: FolderKind,
        filter: &FilterExpr,
    ) -> Result<Vec<String>, AdapterError>;

    /// Store-wide search; used by the sync-aware advanced search.
    fn search(&self, filter: &FilterExpr) -> Result<Vec<MailSnapshot>, AdapterError>;

    /// Whether restricted queries support the conversation-id property.
    fn supports_conversation_filter(&self) -> bool {
        true
    }
}
