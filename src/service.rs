use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

use crate::clipboard::detector::{ChangeDetector, CheckOutcome, ClipboardEvent};
use crate::clipboard::fingerprint::decode_data_url;
use crate::clipboard::scheduler::{HostEvent, MonitorScheduler};
use crate::clipboard::{ClipboardBackend, ClipboardEntry};
use crate::config::AppConfig;
use crate::history::{HistoryStore, SharedHistory};
use crate::{ClipdeckError, Result};

const EVENT_CAPACITY: usize = 100;

/// The clipboard history engine as seen by a host application: monitoring
/// control, clipboard access without echo, history operations and a
/// change feed.
pub struct ClipboardService {
    detector: Arc<ChangeDetector>,
    scheduler: MonitorScheduler,
    history: SharedHistory,
    events: broadcast::Sender<ClipboardEvent>,
}

impl ClipboardService {
    pub fn new(clipboard: Arc<dyn ClipboardBackend>, config: &AppConfig) -> Self {
        Self::with_history(
            clipboard,
            config,
            HistoryStore::new(config.history.max_size),
        )
    }

    /// Start from an existing history, e.g. one restored from storage.
    pub fn with_history(
        clipboard: Arc<dyn ClipboardBackend>,
        config: &AppConfig,
        store: HistoryStore,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let history = Arc::new(RwLock::new(store));

        let detector = Arc::new(ChangeDetector::new(
            clipboard,
            history.clone(),
            events.clone(),
            config.detector.clone(),
        ));
        let scheduler = MonitorScheduler::new(detector.clone(), config.scheduler.clone());

        Self {
            detector,
            scheduler,
            history,
            events,
        }
    }

    pub fn history(&self) -> SharedHistory {
        self.history.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClipboardEvent> {
        self.events.subscribe()
    }

    pub fn start_monitoring(&self) {
        self.scheduler.start_monitoring();
    }

    pub fn stop_monitoring(&self) {
        self.scheduler.stop_monitoring();
    }

    pub fn is_monitoring(&self) -> bool {
        self.scheduler.is_monitoring()
    }

    pub fn handle_host_event(&self, event: &HostEvent) {
        self.scheduler.handle_host_event(event);
    }

    /// Run one detection pass immediately, bypassing the scheduler.
    pub async fn check_now(&self) -> CheckOutcome {
        self.detector.check().await
    }

    pub fn read_from_clipboard(&self) -> String {
        self.detector.read_from_clipboard()
    }

    pub fn write_to_clipboard(&self, text: &str) -> Result<()> {
        self.detector.write_to_clipboard(text)
    }

    pub async fn get_history(&self) -> Vec<ClipboardEntry> {
        self.history.read().await.get_history()
    }

    pub async fn toggle_pin(&self, id: &str) -> bool {
        let (found, pinned) = {
            let mut history = self.history.write().await;
            let found = history.get(id).is_some();
            (found, history.toggle_pin(id))
        };
        if found {
            self.notify_updated();
        }
        pinned
    }

    pub async fn remove_item(&self, id: &str) -> bool {
        let removed = self.history.write().await.remove_item(id);
        if removed {
            self.notify_updated();
        }
        removed
    }

    pub async fn clear_history(&self) {
        self.history.write().await.clear_history();
        info!("Clipboard history cleared (pinned entries kept)");
        self.notify_updated();
    }

    pub async fn set_max_history_size(&self, max_size: usize) {
        self.history.write().await.set_max_history_size(max_size);
        self.notify_updated();
    }

    pub async fn add_tag(&self, id: &str, tag: &str) -> bool {
        let added = self.history.write().await.add_tag(id, tag);
        if added {
            self.notify_updated();
        }
        added
    }

    pub async fn remove_tag(&self, id: &str, tag: &str) -> bool {
        let removed = self.history.write().await.remove_tag(id, tag);
        if removed {
            self.notify_updated();
        }
        removed
    }

    /// Put a history entry back on the clipboard and move it to the front.
    /// Returns `false` for unknown ids. The write is not reported as a
    /// new clipboard change.
    pub async fn copy_entry(&self, id: &str) -> Result<bool> {
        let entry = self.history.read().await.get(id).cloned();
        let Some(entry) = entry else {
            return Ok(false);
        };

        if entry.is_image() {
            let data_url = entry.image_data.as_deref().ok_or_else(|| {
                ClipdeckError::Clipboard(format!("Image entry {id} has no image data"))
            })?;
            let image = decode_data_url(data_url)?;
            self.detector.write_image_to_clipboard(&image)?;
        } else {
            self.detector.write_to_clipboard(&entry.content)?;
        }

        self.history.write().await.promote(id);
        self.notify_updated();
        Ok(true)
    }

    fn notify_updated(&self) {
        if self.events.send(ClipboardEvent::HistoryUpdated).is_err() {
            debug!("No subscribers for history update");
        }
    }
}
