//! Strategy preference watcher for hot reload.
//!
//! Another process (for example `replica-client strategy set`) may rewrite the
//! preference file while a client is running; the watcher pushes the new value
//! to whoever holds the receiver.

use std::path::Path;
use std::time::Duration;
use notify::{Watcher, RecursiveMode, Event, RecommendedWatcher, Config};
use tokio::sync::mpsc;
use crate::config::preference::StrategyStore;
use crate::load_balancer::Strategy;

/// A watcher that monitors the preference file for changes.
pub struct PreferenceWatcher {
    store: StrategyStore,
    update_tx: mpsc::UnboundedSender<Strategy>,
}

impl PreferenceWatcher {
    /// Create a new PreferenceWatcher.
    ///
    /// Returns the watcher and a receiver for strategy updates.
    pub fn new(store: StrategyStore) -> (Self, mpsc::UnboundedReceiver<Strategy>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (Self {
            store,
            update_tx,
        }, update_rx)
    }

    /// Start watching. Returns `Ok(None)` for a memory-only store.
    ///
    /// The parent directory is watched because saves replace the file by rename.
    pub fn run(self) -> Result<Option<RecommendedWatcher>, notify::Error> {
        let Some(path) = self.store.path().map(Path::to_path_buf) else {
            return Ok(None);
        };
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => Path::new(".").to_path_buf(),
        };
        let file_name = path.file_name().map(|n| n.to_os_string());

        let tx = self.update_tx.clone();
        let store = self.store.clone();

        let mut watcher = RecommendedWatcher::new(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    let touches_preference = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);

                    if touches_preference && (event.kind.is_modify() || event.kind.is_create()) {
                        let strategy = store.load();
                        tracing::info!(strategy = %strategy, "Strategy preference changed on disk");
                        let _ = tx.send(strategy);
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            }
        }, Config::default().with_poll_interval(Duration::from_secs(2)))?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?path, "Preference watcher started");
        Ok(Some(watcher))
    }
}
