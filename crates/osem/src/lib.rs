pub mod adapter;
pub mod catchup;
pub mod config;
pub mod error;
pub mod ingest;
pub mod matching;
pub mod model;
pub mod prefs;
pub mod snapshot;
pub mod store;
pub mod text;

pub use adapter::{ConversationScan, FilterExpr, FolderKind, MailSource, SyncState};
pub use catchup::{CatchupConfig, CatchupEngine, CatchupRequest};
pub use config::EngineConfig;
pub use error::{AdapterError, CatchupError, OsemError, PrefsError, Result, StoreError};
pub use ingest::Ingestor;
pub use matching::{Candidate, MatchConfig, MatchReason};
pub use model::{Attachment, Email, Event, EventStatus};
pub use prefs::TemplatePreferences;
pub use snapshot::{AttachmentData, MailSnapshot};
pub use store::{ChangeReason, EventChange, EventStore};
