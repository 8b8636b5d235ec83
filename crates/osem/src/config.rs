use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Locations of the engine's persistent documents.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base data directory, e.g. `<app-data>/OSEM`.
    pub data_dir: PathBuf,
}

impl EngineConfig {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    pub fn event_store_path(&self) -> PathBuf {
        self.data_dir.join("event-store.json")
    }

    pub fn template_preferences_path(&self) -> PathBuf {
        self.data_dir.join("template_preferences.json")
    }
}

/// Tunables for the background catch-up subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatchupConfig {
    /// Seconds between scheduled drain ticks.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    /// Seconds before the first tick after start.
    #[serde(default = "default_initial_tick_secs")]
    pub initial_tick_secs: u64,
    /// Maximum requests drained per tick.
    #[serde(default = "default_drain_limit")]
    pub drain_limit: usize,
    /// Queue capacity; enqueues beyond this are rejected.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Lookback window for normal scans, in days.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
    /// Lookback window for full-history scans, in days.
    #[serde(default = "default_full_history_days")]
    pub full_history_days: i64,
    /// Hours of padding below the earliest known message in an event.
    #[serde(default = "default_lookback_pad_hours")]
    pub lookback_pad_hours: i64,
    /// Debounce before an advanced search fires, in seconds.
    #[serde(default = "default_search_debounce_secs")]
    pub search_debounce_secs: u64,
    /// Creation-time window for advanced searches, in minutes.
    #[serde(default = "default_search_window_mins")]
    pub search_window_mins: i64,
    /// Maximum re-enqueues for an entry-id search that returned nothing.
    #[serde(default = "default_max_search_retries")]
    pub max_search_retries: u32,
    /// Back-off between those retries, in seconds.
    #[serde(default = "default_search_retry_backoff_secs")]
    pub search_retry_backoff_secs: u64,
    /// Interval of the force-drain poll while waiting out a sync, in seconds.
    #[serde(default = "default_sync_poll_secs")]
    pub sync_poll_secs: u64,
    /// Deferred-retry ladder for unresolved live messages, in seconds.
    #[serde(default = "default_deferred_backoff_secs")]
    pub deferred_backoff_secs: Vec<u64>,
}

fn default_tick_secs() -> u64 {
    900
}

fn default_initial_tick_secs() -> u64 {
    10
}

fn default_drain_limit() -> usize {
    20
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_lookback_days() -> i64 {
    14
}

fn default_full_history_days() -> i64 {
    3650
}

fn default_lookback_pad_hours() -> i64 {
    12
}

fn default_search_debounce_secs() -> u64 {
    2
}

fn default_search_window_mins() -> i64 {
    60
}

fn default_max_search_retries() -> u32 {
    10
}

fn default_search_retry_backoff_secs() -> u64 {
    5
}

fn default_sync_poll_secs() -> u64 {
    30
}

fn default_deferred_backoff_secs() -> Vec<u64> {
    vec![20, 60, 180, 300]
}

impl Default for CatchupConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            initial_tick_secs: default_initial_tick_secs(),
            drain_limit: default_drain_limit(),
            queue_capacity: default_queue_capacity(),
            lookback_days: default_lookback_days(),
            full_history_days: default_full_history_days(),
            lookback_pad_hours: default_lookback_pad_hours(),
            search_debounce_secs: default_search_debounce_secs(),
            search_window_mins: default_search_window_mins(),
            max_search_retries: default_max_search_retries(),
            search_retry_backoff_secs: default_search_retry_backoff_secs(),
            sync_poll_secs: default_sync_poll_secs(),
            deferred_backoff_secs: default_deferred_backoff_secs(),
        }
    }
}

impl CatchupConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }

    pub fn initial_tick(&self) -> Duration {
        Duration::from_secs(self.initial_tick_secs)
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_secs(self.search_debounce_secs)
    }

    pub fn sync_poll(&self) -> Duration {
        Duration::from_secs(self.sync_poll_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CatchupConfig::default();
        assert_eq!(config.tick_secs, 900);
        assert_eq!(config.drain_limit, 20);
        assert_eq!(config.lookback_days, 14);
        assert_eq!(config.deferred_backoff_secs, vec![20, 60, 180, 300]);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: CatchupConfig = serde_json::from_str(r#"{"tick_secs": 60}"#).unwrap();
        assert_eq!(config.tick_secs, 60);
        assert_eq!(config.drain_limit, 20);
        assert_eq!(config.max_search_retries, 10);
    }

    #[test]
    fn test_paths() {
        let config = EngineConfig::new("/data/OSEM");
        assert!(config
            .event_store_path()
            .to_string_lossy()
            .ends_with("event-store.json"));
        assert!(config
            .template_preferences_path()
            .to_string_lossy()
            .ends_with("template_preferences.json"));
    }
}
