//! Sync-aware recovery search.
//!
//! Entry-ids the primary catch-up pass could not resolve land here. A
//! debounced "advanced search" asks the source for recently created mail or
//! anything in the queued conversations; messages that failed live delivery
//! first walk a deferred-retry ladder before falling through to the same
//! search. While the source reports an active synchronisation both queues
//! hold their items; a polling timer force-drains them once the sync ends.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::Utc;
use log::{debug, info, warn};
use tokio::sync::mpsc;

use crate::adapter::{FilterExpr, MailSource, SyncState};
use crate::config::CatchupConfig;
use crate::snapshot::MailSnapshot;
use crate::store::EventStore;

/// Retry interval between deferred-ladder checks.
const DEFERRED_TICK: Duration = Duration::from_secs(5);

/// One queued advanced-search request.
#[derive(Debug, Clone)]
pub struct PendingSearch {
    pub event_id: String,
    pub entry_ids: Vec<String>,
    pub conversation_ids: Vec<String>,
    attempts: u32,
    not_before: Instant,
}

/// A live message awaiting its deferred-retry ladder.
#[derive(Debug, Clone)]
struct DeferredMail {
    entry_id: String,
    store_id: String,
    event_id: Option<String>,
    attempt: usize,
    due: Instant,
}

struct SearchInner {
    store: Arc<EventStore>,
    source: Arc<dyn MailSource>,
    sync: Arc<SyncState>,
    config: CatchupConfig,
    pending: Mutex<VecDeque<PendingSearch>>,
    deferred: Mutex<Vec<DeferredMail>>,
}

impl SearchInner {
    fn lock_pending(&self) -> std::sync::MutexGuard<'_, VecDeque<PendingSearch>> {
        match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Pending-search lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn lock_deferred(&self) -> std::sync::MutexGuard<'_, Vec<DeferredMail>> {
        match self.deferred.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Deferred-retry lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn ingest(&self, snapshot: &MailSnapshot, preferred: Option<&str>) -> bool {
        match self.store.try_add_mail(snapshot, preferred) {
            Ok(Some(event)) => {
                debug!(
                    "Recovered mail '{}' into {}",
                    snapshot.entry_id, event.event_id
                );
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!("Recovered mail '{}' rejected: {}", snapshot.entry_id, e);
                false
            }
        }
    }

    /// Runs one advanced search over everything currently due.
    fn run_pending(&self) {
        if self.sync.is_active() {
            self.sync.mark_paused();
            debug!("Advanced search deferred: mail source sync in progress");
            return;
        }

        let now = Instant::now();
        let due: Vec<PendingSearch> = {
            let mut pending = self.lock_pending();
            let mut due = Vec::new();
            let mut keep = VecDeque::new();
            while let Some(item) = pending.pop_front() {
                if item.not_before <= now {
                    due.push(item);
                } else {
                    keep.push_back(item);
                }
            }
            *pending = keep;
            due
        };
        if due.is_empty() {
            return;
        }

        // One combined search: recently created mail, or anything in the
        // queued conversations.
        let window = Utc::now() - chrono::Duration::minutes(self.config.search_window_mins);
        let mut terms = vec![FilterExpr::CreatedSince(window)];
        let mut conversation_owner: HashMap<String, String> = HashMap::new();
        let mut entry_owner: HashMap<String, String> = HashMap::new();
        for item in &due {
            for conversation in &item.conversation_ids {
                if conversation_owner
                    .insert(conversation.to_uppercase(), item.event_id.clone())
                    .is_none()
                {
                    terms.push(FilterExpr::ConversationId(conversation.clone()));
                }
            }
            for entry in &item.entry_ids {
                entry_owner.insert(entry.to_uppercase(), item.event_id.clone());
            }
        }

        let filter = FilterExpr::or(terms);
        let results = match self.source.search(&filter) {
            Ok(results) => results,
            Err(e) => {
                warn!("Advanced search failed: {}", e);
                self.requeue_unanswered(due);
                return;
            }
        };
        info!("Advanced search returned {} messages", results.len());

        for snapshot in &results {
            let preferred = entry_owner
                .get(&snapshot.entry_id.to_uppercase())
                .or_else(|| conversation_owner.get(&snapshot.conversation_id.to_uppercase()))
                .cloned();
            self.ingest(snapshot, preferred.as_deref());
        }

        if results.is_empty() {
            self.requeue_unanswered(due);
        }
    }

    /// Zero-result searches with targeted entry-ids retry up to the cap,
    /// gated by a back-off.
    fn requeue_unanswered(&self, due: Vec<PendingSearch>) {
        let backoff = Duration::from_secs(self.config.search_retry_backoff_secs);
        let mut pending = self.lock_pending();
        for mut item in due {
            if item.entry_ids.is_empty() {
                continue;
            }
            if item.attempts >= self.config.max_search_retries {
                warn!(
                    "Giving up on entry-ids {:?} after {} retries",
                    item.entry_ids, item.attempts
                );
                continue;
            }
            item.attempts += 1;
            item.not_before = Instant::now() + backoff;
            pending.push_back(item);
        }
    }

    /// Walks the deferred-retry ladder for messages that failed live
    /// resolution.
    fn run_deferred(&self) {
        if self.sync.is_active() {
            self.sync.mark_paused();
            return;
        }

        let now = Instant::now();
        let due: Vec<DeferredMail> = {
            let mut deferred = self.lock_deferred();
            let mut due = Vec::new();
            deferred.retain(|item| {
                if item.due <= now {
                    due.push(item.clone());
                    false
                } else {
                    true
                }
            });
            due
        };

        for item in due {
            let store_id = if item.store_id.is_empty() {
                None
            } else {
                Some(item.store_id.as_str())
            };
            match self.source.resolve_by_id(&item.entry_id, store_id) {
                Ok(Some(snapshot)) => {
                    self.ingest(&snapshot, item.event_id.as_deref());
                }
                Ok(None) => self.retry_or_escalate(item),
                Err(e) if e.is_transient() => {
                    debug!("Deferred resolve of '{}' still failing: {}", item.entry_id, e);
                    self.retry_or_escalate(item);
                }
                Err(e) => warn!("Deferred resolve of '{}' failed: {}", item.entry_id, e),
            }
        }
    }

    /// Advances the ladder, or falls through to advanced-search recovery
    /// once it is exhausted.
    fn retry_or_escalate(&self, mut item: DeferredMail) {
        item.attempt += 1;
        match self.config.deferred_backoff_secs.get(item.attempt) {
            Some(backoff) => {
                item.due = Instant::now() + Duration::from_secs(*backoff);
                self.lock_deferred().push(item);
            }
            None => {
                debug!(
                    "Deferred retries exhausted for '{}'; escalating to search",
                    item.entry_id
                );
                self.lock_pending().push_back(PendingSearch {
                    event_id: item.event_id.unwrap_or_default(),
                    entry_ids: vec![item.entry_id],
                    conversation_ids: Vec::new(),
                    attempts: 0,
                    not_before: Instant::now(),
                });
            }
        }
    }
}

/// Owner of the recovery queues and their worker thread.
pub struct SyncAwareSearch {
    inner: Arc<SearchInner>,
    shutdown: Arc<AtomicBool>,
    wake_tx: mpsc::UnboundedSender<()>,
    wake_rx: Mutex<Option<mpsc::UnboundedReceiver<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SyncAwareSearch {
    pub(crate) fn new(
        store: Arc<EventStore>,
        source: Arc<dyn MailSource>,
        sync: Arc<SyncState>,
        config: CatchupConfig,
    ) -> Self {
        let (wake_tx, wake_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(SearchInner {
                store,
                source,
                sync,
                config,
                pending: Mutex::new(VecDeque::new()),
                deferred: Mutex::new(Vec::new()),
            }),
            shutdown: Arc::new(AtomicBool::new(false)),
            wake_tx,
            wake_rx: Mutex::new(Some(wake_rx)),
            handle: Mutex::new(None),
        }
    }

    /// Starts the worker thread. Idempotent per instance; a second call is a
    /// no-op once the receiver is taken.
    pub fn start(&self) {
        let Some(mut wake_rx) = self.wake_rx.lock().ok().and_then(|mut g| g.take()) else {
            return;
        };
        let inner = Arc::clone(&self.inner);
        let shutdown = Arc::clone(&self.shutdown);
        let debounce = inner.config.search_debounce();
        let poll = inner.config.sync_poll();

        let handle = std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            rt.block_on(async {
                let mut poll_timer = tokio::time::interval(poll);
                poll_timer.tick().await;
                let mut retry_timer = tokio::time::interval(DEFERRED_TICK);
                retry_timer.tick().await;

                loop {
                    if shutdown.load(Ordering::Acquire) {
                        break;
                    }

                    tokio::select! {
                        received = wake_rx.recv() => {
                            if received.is_none() {
                                break;
                            }
                            tokio::time::sleep(debounce).await;
                            while wake_rx.try_recv().is_ok() {}
                            if shutdown.load(Ordering::Acquire) {
                                break;
                            }
                            inner.run_pending();
                        }
                        _ = poll_timer.tick() => {
                            inner.run_pending();
                        }
                        _ = retry_timer.tick() => {
                            inner.run_deferred();
                        }
                    }
                }
            });
        });

        if let Ok(mut guard) = self.handle.lock() {
            *guard = Some(handle);
        }
    }

    /// Signals the worker to stop and joins it.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
        let _ = self.wake_tx.send(());

        let handle = self.handle.lock().ok().and_then(|mut g| g.take());
        if let Some(handle) = handle {
            let deadline = Instant::now() + Duration::from_secs(5);
            loop {
                if handle.is_finished() {
                    let _ = handle.join();
                    break;
                }
                if Instant::now() >= deadline {
                    warn!("Search thread did not stop within timeout");
                    break;
                }
                std::thread::sleep(Duration::from_millis(50));
            }
        }
    }

    /// Queues unresolved ids for the next debounced advanced search.
    pub fn enqueue(&self, event_id: &str, entry_ids: Vec<String>, conversation_ids: Vec<String>) {
        if entry_ids.is_empty() && conversation_ids.is_empty() {
            return;
        }
        self.inner.lock_pending().push_back(PendingSearch {
            event_id: event_id.to_string(),
            entry_ids,
            conversation_ids,
            attempts: 0,
            not_before: Instant::now(),
        });
        let _ = self.wake_tx.send(());
    }

    /// Schedules a live-delivery failure onto the deferred-retry ladder.
    pub fn defer(&self, entry_id: &str, store_id: &str, preferred_event_id: Option<&str>) {
        let first_backoff = self
            .inner
            .config
            .deferred_backoff_secs
            .first()
            .copied()
            .unwrap_or(20);
        self.inner.lock_deferred().push(DeferredMail {
            entry_id: entry_id.to_string(),
            store_id: store_id.to_string(),
            event_id: preferred_event_id.map(|s| s.to_string()),
            attempt: 0,
            due: Instant::now() + Duration::from_secs(first_backoff),
        });
    }

    pub fn pending_len(&self) -> usize {
        self.inner.lock_pending().len()
    }

    pub fn deferred_len(&self) -> usize {
        self.inner.lock_deferred().len()
    }

    /// Runs the due queues on the calling thread; used by immediate
    /// catch-up and by tests.
    pub fn drain_now(&self) {
        self.inner.run_deferred();
        self.inner.run_pending();
    }
}

impl Drop for SyncAwareSearch {
    fn drop(&mut self) {
        self.stop();
    }
}
