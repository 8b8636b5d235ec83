use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OsemError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Mail source error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("Catch-up error: {0}")]
    Catchup(#[from] CatchupError),

    #[error("Preference store error: {0}")]
    Prefs(#[from] PrefsError),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Event '{event_id}' not found")]
    NotFound { event_id: String },

    #[error("Invalid mail snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("Event store file '{path}' is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to read event store '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write event store '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure kinds reported by a mail-source adapter.
///
/// The ingestion facade never propagates these: transient failures feed the
/// deferred-retry queue, permanently missing messages are marked not-found.
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("Mail source session unavailable: {0}")]
    SessionUnavailable(String),

    #[error("Transient mail source failure: {0}")]
    Transient(String),

    #[error("Message permanently missing: {0}")]
    PermanentMissing(String),

    #[error("Mail source failure: {0}")]
    Other(String),
}

impl AdapterError {
    /// Whether a retry can reasonably be expected to succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AdapterError::Transient(_) | AdapterError::SessionUnavailable(_)
        )
    }
}

#[derive(Error, Debug)]
pub enum CatchupError {
    #[error("Catch-up queue is full")]
    QueueFull,

    #[error("Immediate catch-up timed out: {0}")]
    Timeout(String),

    #[error("Catch-up worker channel closed unexpectedly")]
    ChannelClosed,
}

#[derive(Error, Debug)]
pub enum PrefsError {
    #[error("Failed to read preferences '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse preferences JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Failed to write preferences '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, OsemError>;
