use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};

use super::detector::ClipboardEvent;
use crate::history::SharedHistory;
use crate::storage::{Storage, CLIPBOARD_HISTORY};
use crate::Result;

/// Persists history snapshots as change notifications arrive. Runs on its
/// own task so storage latency never reaches the detector.
pub struct HistoryPersister {
    storage: Arc<Storage>,
    history: SharedHistory,
}

impl HistoryPersister {
    pub fn new(storage: Arc<Storage>, history: SharedHistory) -> Self {
        Self { storage, history }
    }

    pub async fn start_processing(self, mut event_rx: broadcast::Receiver<ClipboardEvent>) {
        info!("History persister started");

        loop {
            match event_rx.recv().await {
                Ok(event) => {
                    if let Err(e) = self.process_event(&event).await {
                        error!("Failed to persist clipboard history: {}", e);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("History persister skipped {} event(s)", skipped);
                    if let Err(e) = self.save_snapshot().await {
                        error!("Failed to persist clipboard history: {}", e);
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }

        info!("History persister stopped");
    }

    async fn process_event(&self, event: &ClipboardEvent) -> Result<()> {
        match event {
            ClipboardEvent::Changed(entry) => debug!("Persisting after new entry {}", entry.id),
            ClipboardEvent::HistoryUpdated => debug!("Persisting after history edit"),
        }
        self.save_snapshot().await
    }

    pub async fn save_snapshot(&self) -> Result<()> {
        let snapshot = self.history.read().await.get_history();
        self.storage.save(CLIPBOARD_HISTORY, &snapshot).await
    }
}
