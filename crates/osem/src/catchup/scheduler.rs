//! Periodic catch-up drain scheduler.
//!
//! Dedicated thread running a current-thread runtime: one initial tick
//! shortly after start, then a steady interval, with a manual trigger that
//! wakes the select loop early.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use log::{info, warn};
use tokio::sync::broadcast;

use super::EngineCore;

pub(crate) struct CatchupScheduler {
    shutdown: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
    trigger_tx: broadcast::Sender<()>,
}

impl CatchupScheduler {
    pub fn new() -> Self {
        let (trigger_tx, _) = broadcast::channel(16);
        Self {
            shutdown: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
            trigger_tx,
        }
    }

    /// Wakes the drain loop ahead of its next tick.
    pub fn trigger(&self) {
        let _ = self.trigger_tx.send(());
    }

    /// Starts the drain loop in a background thread.
    pub fn start(&self, core: Arc<EngineCore>) {
        let shutdown = Arc::clone(&self.shutdown);
        let mut trigger_rx = self.trigger_tx.subscribe();
        let initial = core.config.initial_tick();
        let interval = core.config.tick_interval();

        let handle = std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            rt.block_on(async {
                // First tick comes early so a fresh start catches up
                // without waiting a full interval.
                tokio::select! {
                    _ = tokio::time::sleep(initial) => {},
                    Ok(()) = trigger_rx.recv() => {},
                }
                if shutdown.load(Ordering::Acquire) {
                    return;
                }
                core.drain_tick();

                let mut interval_timer = tokio::time::interval(interval);
                interval_timer.tick().await;

                loop {
                    if shutdown.load(Ordering::Acquire) {
                        break;
                    }

                    tokio::select! {
                        _ = interval_timer.tick() => {},
                        Ok(()) = trigger_rx.recv() => {
                            info!("Manual catch-up drain triggered");
                        },
                    }

                    if shutdown.load(Ordering::Acquire) {
                        break;
                    }
                    core.drain_tick();
                }
            });
        });

        if let Ok(mut guard) = self.handle.lock() {
            *guard = Some(handle);
        }
    }

    /// Signals the scheduler to stop and waits for the thread to finish.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
        let _ = self.trigger_tx.send(());

        let handle = self.handle.lock().ok().and_then(|mut g| g.take());
        if let Some(handle) = handle {
            let deadline = std::time::Instant::now() + Duration::from_secs(5);
            loop {
                if handle.is_finished() {
                    let _ = handle.join();
                    break;
                }
                if std::time::Instant::now() >= deadline {
                    warn!("Catch-up scheduler thread did not stop within timeout");
                    break;
                }
                std::thread::sleep(Duration::from_millis(50));
            }
        }
    }
}
