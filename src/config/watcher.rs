//! Configuration file watcher for hot reload.
//!
//! A single editor save produces a burst of filesystem events; the
//! watcher debounces the burst, reloads through the validating loader
//! and suppresses rewrites that do not change the effective
//! configuration. Consumers therefore only ever see real, valid
//! changes; an invalid rewrite is logged and the running configuration
//! stays in force.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::TrustConfig;

/// Quiet period after the last filesystem event before reloading.
const DEBOUNCE: Duration = Duration::from_millis(250);

/// Tracks the last accepted configuration by its serialized form.
struct ChangeTracker {
    last: Option<String>,
}

impl ChangeTracker {
    fn new() -> Self {
        Self { last: None }
    }

    /// True when `config` differs from the last accepted one.
    fn accept(&mut self, config: &TrustConfig) -> bool {
        let fingerprint = toml::to_string(config).unwrap_or_default();
        if self.last.as_deref() == Some(fingerprint.as_str()) {
            return false;
        }
        self.last = Some(fingerprint);
        true
    }
}

/// Watches one configuration file and emits validated updates.
pub struct ConfigWatcher {
    path: PathBuf,
}

impl ConfigWatcher {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Start watching. Returns the filesystem watcher, which must stay
    /// alive for events to keep flowing, and the stream of validated
    /// configuration updates.
    pub fn spawn(
        self,
    ) -> Result<(RecommendedWatcher, mpsc::UnboundedReceiver<TrustConfig>), notify::Error> {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    let _ = event_tx.send(());
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Config watch error"),
            },
            notify::Config::default(),
        )?;
        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let path = self.path.clone();
        tokio::spawn(async move {
            let mut tracker = ChangeTracker::new();
            while event_rx.recv().await.is_some() {
                // Drain the rest of the burst before reloading.
                loop {
                    match tokio::time::timeout(DEBOUNCE, event_rx.recv()).await {
                        Ok(Some(())) => continue,
                        Ok(None) | Err(_) => break,
                    }
                }

                match load_config(&path) {
                    Ok(config) if tracker.accept(&config) => {
                        tracing::info!(path = ?path, "Configuration changed on disk");
                        if update_tx.send(config).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {
                        tracing::debug!(path = ?path, "Configuration rewritten without changes");
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = ?path,
                            error = %e,
                            "Rejected reload, keeping the running configuration"
                        );
                    }
                }
            }
        });

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok((watcher, update_rx))
    }
}
