//! Background catch-up: recovers messages the live path missed.

pub mod queue;
pub mod scan;
mod scheduler;
pub mod search;

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::debug;

use crate::adapter::{MailSource, SyncState};
use crate::error::CatchupError;
use crate::store::EventStore;

pub use crate::config::CatchupConfig;
pub use queue::{CatchupQueue, CatchupRequest};
pub use scan::ScanReport;
pub use search::SyncAwareSearch;

use scan::CatchupWorker;
use scheduler::CatchupScheduler;

/// Shared state between the scheduler thread and immediate processing.
pub(crate) struct EngineCore {
    pub(crate) queue: CatchupQueue,
    pub(crate) config: CatchupConfig,
    worker: CatchupWorker,
    sync: Arc<SyncState>,
    search: Arc<SyncAwareSearch>,
    /// Serialises drains so only one runs at a time.
    drain_gate: Mutex<()>,
}

impl EngineCore {
    /// Drains up to the per-tick limit. Skipped entirely while the mail
    /// source is synchronising.
    pub(crate) fn drain_tick(&self) {
        if self.sync.is_active() {
            self.sync.mark_paused();
            debug!("Catch-up drain skipped: mail source sync in progress");
            return;
        }
        let Ok(_gate) = self.drain_gate.try_lock() else {
            return;
        };

        for _ in 0..self.config.drain_limit {
            let Some(request) = self.queue.pop() else {
                break;
            };
            self.run_request(&request);
        }
    }

    fn run_request(&self, request: &CatchupRequest) {
        let Some(report) = self.worker.process(request) else {
            debug!(
                "Skipping catch-up for {}: event gone or archived",
                request.event_id
            );
            return;
        };
        if !report.pending_entry_ids.is_empty() {
            self.search.enqueue(
                &report.event_id,
                report.pending_entry_ids.clone(),
                vec![report.conversation_id.clone()],
            );
        }
    }
}

/// The catch-up subsystem: bounded request queue, periodic drain scheduler,
/// and the sync-aware recovery search.
pub struct CatchupEngine {
    core: Arc<EngineCore>,
    scheduler: CatchupScheduler,
    search: Arc<SyncAwareSearch>,
    sync: Arc<SyncState>,
}

impl CatchupEngine {
    pub fn new(
        store: Arc<EventStore>,
        source: Arc<dyn MailSource>,
        sync: Arc<SyncState>,
        config: CatchupConfig,
    ) -> Self {
        let search = Arc::new(SyncAwareSearch::new(
            Arc::clone(&store),
            Arc::clone(&source),
            Arc::clone(&sync),
            config.clone(),
        ));
        let core = Arc::new(EngineCore {
            queue: CatchupQueue::new(config.queue_capacity),
            worker: CatchupWorker::new(store, source, config.clone()),
            config,
            sync: Arc::clone(&sync),
            search: Arc::clone(&search),
            drain_gate: Mutex::new(()),
        });

        Self {
            core,
            scheduler: CatchupScheduler::new(),
            search,
            sync,
        }
    }

    /// Starts the scheduler and search worker threads.
    pub fn start(&self) {
        self.scheduler.start(Arc::clone(&self.core));
        self.search.start();
    }

    /// Stops both worker threads.
    pub fn stop(&self) {
        self.scheduler.stop();
        self.search.stop();
    }

    /// Admits one `(event, conversation)` request; returns whether it was
    /// newly enqueued.
    pub fn enqueue(
        &self,
        event_id: &str,
        conversation_id: &str,
        full_history: bool,
    ) -> Result<bool, CatchupError> {
        self.core
            .queue
            .enqueue(CatchupRequest::new(event_id, conversation_id, full_history))
    }

    pub fn is_tracked(&self, event_id: &str, conversation_id: &str) -> bool {
        self.core.queue.is_tracked(event_id, conversation_id)
    }

    pub fn queue_len(&self) -> usize {
        self.core.queue.len()
    }

    /// Wakes the scheduler ahead of its next tick.
    pub fn trigger(&self) {
        self.scheduler.trigger();
    }

    pub fn sync_state(&self) -> &Arc<SyncState> {
        &self.sync
    }

    pub fn search(&self) -> &SyncAwareSearch {
        &self.search
    }

    /// Processes the given event's queued requests on the calling thread
    /// until they are drained or the timeout elapses. Remaining items stay
    /// queued for the regular tick. Returns the number of requests
    /// processed.
    pub fn process_immediate(&self, event_id: &str, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        self.core.queue.rotate_to_front(event_id);

        let mut processed = 0;
        loop {
            if Instant::now() >= deadline {
                debug!("Immediate catch-up for {} hit its deadline", event_id);
                break;
            }
            if self.sync.is_active() {
                self.sync.mark_paused();
                debug!("Immediate catch-up paused by mail source sync");
                break;
            }

            let Ok(_gate) = self.core.drain_gate.try_lock() else {
                std::thread::sleep(Duration::from_millis(10));
                continue;
            };
            let Some(request) = self.core.queue.pop_for(event_id) else {
                break;
            };
            self.core.run_request(&request);
            processed += 1;
        }
        processed
    }
}

impl Drop for CatchupEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
