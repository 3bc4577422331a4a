use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{Settings, SettingsError, SettingsStore};

/// Best-effort local copy of the settings, refreshed from store notifications.
#[derive(Clone)]
pub struct SettingsCache {
    tx: Arc<watch::Sender<Settings>>,
}

impl SettingsCache {
    pub fn new(initial: Settings) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Loads the current settings and keeps the cache in sync with `store`
    /// until the store's change channel closes.
    pub fn spawn_from_store(
        store: Arc<dyn SettingsStore>,
    ) -> Result<(Self, JoinHandle<()>), SettingsError> {
        let mut changes = store.subscribe();
        let cache = Self::new(store.load()?);
        let worker_cache = cache.clone();

        let handle = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(settings) => worker_cache.update(settings),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "settings notifications lagged; reloading");
                        let store = Arc::clone(&store);
                        match tokio::task::spawn_blocking(move || store.load()).await {
                            Ok(Ok(settings)) => worker_cache.update(settings),
                            Ok(Err(err)) => warn!("failed to reload settings after lag: {err}"),
                            Err(err) => warn!("settings reload task failed: {err}"),
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok((cache, handle))
    }

    pub fn current(&self) -> Settings {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Settings> {
        self.tx.subscribe()
    }

    pub fn update(&self, settings: Settings) {
        self.tx.send_replace(settings);
    }
}
