//! Runtime knobs consumed by the hub.

use std::time::Duration;

use crate::entry::EntryOptions;
use crate::process::WorkerLauncher;

/// Quiescence window used when nothing else is configured.
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(100);

/// Configuration for the directory watch multiplexer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchConfig {
    /// Window for coalescing bursts of filesystem events into one rescan.
    pub debounce_window: Duration,
    /// Fill `mime` on file entries from their extension.
    pub sniff_mime: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_window: DEFAULT_DEBOUNCE_WINDOW,
            sniff_mime: false,
        }
    }
}

impl WatchConfig {
    pub fn entry_options(&self) -> EntryOptions {
        EntryOptions {
            sniff_mime: self.sniff_mime,
        }
    }
}

/// Everything a [`Hub`](crate::hub::Hub) needs at construction.
#[derive(Clone, Debug)]
pub struct HubConfig {
    pub watch: WatchConfig,
    pub launcher: WorkerLauncher,
}

impl HubConfig {
    pub fn new(launcher: WorkerLauncher) -> Self {
        Self {
            watch: WatchConfig::default(),
            launcher,
        }
    }

    pub fn with_watch(mut self, watch: WatchConfig) -> Self {
        self.watch = watch;
        self
    }
}
