//! Mail-source synchronisation tracking.
//!
//! The source reports `SyncStart`/`SyncEnd` around its own send/receive
//! cycles. While the counter is above zero the catch-up engine holds its
//! queues; the last `SyncEnd` wakes them.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use log::{debug, warn};
use tokio::sync::Notify;

#[derive(Default)]
pub struct SyncState {
    active: AtomicI64,
    paused_by_sync: AtomicBool,
    resumed: Notify,
}

impl SyncState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sync_start(&self) {
        let previous = self.active.fetch_add(1, Ordering::SeqCst);
        debug!("Mail source sync started (depth {})", previous + 1);
    }

    pub fn sync_end(&self) {
        let previous = self.active.fetch_sub(1, Ordering::SeqCst);
        if previous <= 0 {
            warn!("SyncEnd without matching SyncStart");
            self.active.store(0, Ordering::SeqCst);
        }
        if previous <= 1 {
            debug!("Mail source sync ended; resuming catch-up");
            self.paused_by_sync.store(false, Ordering::SeqCst);
            self.resumed.notify_waiters();
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst) > 0
    }

    /// Marks that a worker deferred work because a sync was running.
    pub fn mark_paused(&self) {
        self.paused_by_sync.store(true, Ordering::SeqCst);
    }

    pub fn paused_by_sync(&self) -> bool {
        self.paused_by_sync.load(Ordering::SeqCst)
    }

    /// Completes when the next sync cycle ends. Returns immediately if no
    /// sync is running.
    pub async fn wait_until_idle(&self) {
        while self.is_active() {
            let notified = self.resumed.notified();
            if !self.is_active() {
                break;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_balance() {
        let state = SyncState::new();
        assert!(!state.is_active());

        state.sync_start();
        state.sync_start();
        assert!(state.is_active());

        state.sync_end();
        assert!(state.is_active());
        state.sync_end();
        assert!(!state.is_active());
    }

    #[test]
    fn test_unbalanced_end_clamps_to_zero() {
        let state = SyncState::new();
        state.sync_end();
        assert!(!state.is_active());
        state.sync_start();
        assert!(state.is_active());
    }

    #[test]
    fn test_paused_flag_clears_on_end() {
        let state = SyncState::new();
        state.sync_start();
        state.mark_paused();
        assert!(state.paused_by_sync());
        state.sync_end();
        assert!(!state.paused_by_sync());
    }

    #[tokio::test]
    async fn test_wait_until_idle_immediate_when_no_sync() {
        let state = SyncState::new();
        state.wait_until_idle().await;
    }
}
