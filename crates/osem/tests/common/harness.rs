//! Test harness: an isolated engine over a scripted in-memory mail source.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tempfile::TempDir;

use osem::adapter::{
    ConversationEntry, ConversationScan, FilterExpr, FolderKind, MailSource, SyncState,
};
use osem::catchup::{CatchupConfig, CatchupEngine};
use osem::config::EngineConfig;
use osem::error::AdapterError;
use osem::matching::MatchConfig;
use osem::prefs::TemplatePreferences;
use osem::snapshot::MailSnapshot;
use osem::store::EventStore;
use osem::Ingestor;

/// Scripted mail source: a pool of snapshots with folder tags and optional
/// conversation size reports.
#[derive(Default)]
pub struct FakeMailSource {
    state: Mutex<FakeState>,
}

#[derive(Default)]
struct FakeState {
    mails: HashMap<String, (FolderKind, MailSnapshot)>,
    conversation_totals: HashMap<String, usize>,
    transient_failures: HashSet<String>,
    search_calls: usize,
}

impl FakeMailSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a mail to the Inbox pool.
    pub fn add_mail(&self, snapshot: MailSnapshot) {
        self.add_mail_in(FolderKind::Inbox, snapshot);
    }

    pub fn add_mail_in(&self, folder: FolderKind, snapshot: MailSnapshot) {
        let mut state = self.state.lock().unwrap();
        state
            .mails
            .insert(snapshot.entry_id.to_uppercase(), (folder, snapshot));
    }

    pub fn remove_mail(&self, entry_id: &str) {
        let mut state = self.state.lock().unwrap();
        state.mails.remove(&entry_id.to_uppercase());
    }

    /// Overrides the total size the conversation walk reports.
    pub fn set_conversation_total(&self, conversation_id: &str, total: usize) {
        let mut state = self.state.lock().unwrap();
        state
            .conversation_totals
            .insert(conversation_id.to_uppercase(), total);
    }

    /// Makes `resolve_by_id` fail transiently for one entry-id.
    pub fn fail_resolve(&self, entry_id: &str) {
        let mut state = self.state.lock().unwrap();
        state.transient_failures.insert(entry_id.to_uppercase());
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock().unwrap();
        state.transient_failures.clear();
    }

    pub fn search_calls(&self) -> usize {
        self.state.lock().unwrap().search_calls
    }

    fn matches(snapshot: &MailSnapshot, filter: &FilterExpr) -> bool {
        match filter {
            FilterExpr::ReceivedSince(since) | FilterExpr::CreatedSince(since) => {
                snapshot.received_on >= *since
            }
            FilterExpr::ConversationId(id) => snapshot.conversation_id.eq_ignore_ascii_case(id),
            FilterExpr::SubjectPhrase { phrase, .. } => snapshot
                .subject
                .to_uppercase()
                .contains(&phrase.to_uppercase()),
            FilterExpr::All(terms) => terms.iter().all(|t| Self::matches(snapshot, t)),
            FilterExpr::Any(terms) => terms.iter().any(|t| Self::matches(snapshot, t)),
        }
    }
}

impl MailSource for FakeMailSource {
    fn resolve_by_id(
        &self,
        entry_id: &str,
        _store_id: Option<&str>,
    ) -> Result<Option<MailSnapshot>, AdapterError> {
        let state = self.state.lock().unwrap();
        if state.transient_failures.contains(&entry_id.to_uppercase()) {
            return Err(AdapterError::Transient(format!(
                "resolve of '{entry_id}' failed"
            )));
        }
        Ok(state
            .mails
            .get(&entry_id.to_uppercase())
            .map(|(_, snapshot)| snapshot.clone()))
    }

    fn enumerate_conversation(
        &self,
        _seed_entry_id: &str,
        conversation_id: &str,
        since: DateTime<Utc>,
    ) -> Result<ConversationScan, AdapterError> {
        let state = self.state.lock().unwrap();
        let mut entries: Vec<ConversationEntry> = state
            .mails
            .values()
            .filter(|(_, snapshot)| {
                snapshot.conversation_id.eq_ignore_ascii_case(conversation_id)
                    && snapshot.received_on >= since
            })
            .map(|(_, snapshot)| ConversationEntry {
                entry_id: snapshot.entry_id.clone(),
                store_id: snapshot.store_id.clone(),
            })
            .collect();
        entries.sort_by(|a, b| a.entry_id.cmp(&b.entry_id));

        let total = state
            .conversation_totals
            .get(&conversation_id.to_uppercase())
            .copied()
            .or(Some(entries.len()));
        Ok(ConversationScan {
            entries,
            total_size: total,
        })
    }

    fn restrict_folder(
        &self,
        folder: FolderKind,
        filter: &FilterExpr,
    ) -> Result<Vec<String>, AdapterError> {
        let state = self.state.lock().unwrap();
        let mut ids: Vec<String> = state
            .mails
            .values()
            .filter(|(mail_folder, snapshot)| {
                *mail_folder == folder && Self::matches(snapshot, filter)
            })
            .map(|(_, snapshot)| snapshot.entry_id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn search(&self, filter: &FilterExpr) -> Result<Vec<MailSnapshot>, AdapterError> {
        let mut state = self.state.lock().unwrap();
        state.search_calls += 1;
        let mut results: Vec<MailSnapshot> = state
            .mails
            .values()
            .filter(|(_, snapshot)| Self::matches(snapshot, filter))
            .map(|(_, snapshot)| snapshot.clone())
            .collect();
        results.sort_by(|a, b| a.entry_id.cmp(&b.entry_id));
        Ok(results)
    }
}

/// A complete isolated engine: temp-dir store, scripted source, catch-up
/// engine (worker threads not started; tests drive immediate processing).
pub struct TestHarness {
    temp_dir: TempDir,
    pub store: Arc<EventStore>,
    pub source: Arc<FakeMailSource>,
    pub sync: Arc<SyncState>,
    pub prefs: Arc<TemplatePreferences>,
    pub catchup: Arc<CatchupEngine>,
    pub ingestor: Ingestor,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_configs(MatchConfig::default(), CatchupConfig::default())
    }

    pub fn with_configs(match_config: MatchConfig, catchup_config: CatchupConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let engine_config = EngineConfig::new(temp_dir.path());

        let store = Arc::new(
            EventStore::open(engine_config.event_store_path(), match_config)
                .expect("Failed to open event store"),
        );
        let prefs = Arc::new(
            TemplatePreferences::open(engine_config.template_preferences_path())
                .expect("Failed to open template preferences"),
        );
        let source = Arc::new(FakeMailSource::new());
        let sync = Arc::new(SyncState::new());
        let catchup = Arc::new(CatchupEngine::new(
            Arc::clone(&store),
            Arc::clone(&source) as Arc<dyn MailSource>,
            Arc::clone(&sync),
            catchup_config,
        ));
        let ingestor = Ingestor::new(
            Arc::clone(&store),
            Arc::clone(&prefs),
            Arc::clone(&catchup),
        );

        Self {
            temp_dir,
            store,
            source,
            sync,
            prefs,
            catchup,
            ingestor,
        }
    }

    pub fn store_path(&self) -> std::path::PathBuf {
        self.temp_dir.path().join("event-store.json")
    }

    /// Creates an event directly in the store (no catch-up backfill) and
    /// registers the mail with the scripted source.
    pub fn seed_event(&self, snapshot: MailSnapshot) -> osem::Event {
        self.source.add_mail(snapshot.clone());
        self.store.create_from_mail(&snapshot, None, None)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
