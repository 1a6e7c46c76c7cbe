use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::entry::{ClipboardEntry, ImageSize};
use super::fingerprint::{encode_png, image_fingerprint, png_data_url, DEFAULT_SAMPLE_STRIDE};
use super::{ClipboardBackend, ImagePayload};
use crate::history::SharedHistory;
use crate::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Encoded PNG size above which images are skipped.
    pub max_image_bytes: usize,
    /// How long a programmatic write may wait for its echo before the
    /// suppression flag is force-cleared.
    pub suppression_window_ms: u64,
    pub sample_stride: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            max_image_bytes: crate::MAX_IMAGE_BYTES,
            suppression_window_ms: 1200,
            sample_stride: DEFAULT_SAMPLE_STRIDE,
        }
    }
}

/// Notifications published to every subscriber of the service.
#[derive(Debug, Clone)]
pub enum ClipboardEvent {
    /// A genuine external clipboard change produced this entry.
    Changed(ClipboardEntry),
    /// History was edited through pin/remove/clear/resize/tag operations.
    HistoryUpdated,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    /// Another check was running; this one did nothing.
    Busy,
    Unchanged,
    /// The change was our own write echoing back.
    Suppressed,
    DuplicateImage,
    OversizedImage,
    Changed(ClipboardEntry),
    /// The clipboard could not be read; logged and skipped.
    Failed,
}

#[derive(Debug, Default)]
struct DetectorState {
    last_text: String,
    last_image_fingerprint: String,
}

/// Single-shot "ignore the next change" flag. Each arm bumps a generation
/// so a stale safety timer never clears a newer write's flag.
#[derive(Debug, Default)]
struct Suppression {
    ignore_next_change: AtomicBool,
    generation: AtomicU64,
}

impl Suppression {
    fn arm(&self) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.ignore_next_change.store(true, Ordering::SeqCst);
        generation
    }

    /// Clear the flag if no newer write re-armed it.
    fn disarm(&self, generation: u64) -> bool {
        if self.generation.load(Ordering::SeqCst) == generation {
            self.ignore_next_change.swap(false, Ordering::SeqCst)
        } else {
            false
        }
    }

    fn consume(&self) -> bool {
        self.ignore_next_change.swap(false, Ordering::SeqCst)
    }

    fn is_armed(&self) -> bool {
        self.ignore_next_change.load(Ordering::SeqCst)
    }
}

struct CheckGuard<'a>(&'a AtomicBool);

impl Drop for CheckGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Decides whether the clipboard changed since the last look and turns
/// genuine external changes into history entries.
pub struct ChangeDetector {
    clipboard: Arc<dyn ClipboardBackend>,
    history: SharedHistory,
    events: broadcast::Sender<ClipboardEvent>,
    config: DetectorConfig,
    state: Mutex<DetectorState>,
    suppression: Arc<Suppression>,
    check_in_progress: AtomicBool,
}

impl ChangeDetector {
    pub fn new(
        clipboard: Arc<dyn ClipboardBackend>,
        history: SharedHistory,
        events: broadcast::Sender<ClipboardEvent>,
        config: DetectorConfig,
    ) -> Self {
        Self {
            clipboard,
            history,
            events,
            config,
            state: Mutex::new(DetectorState::default()),
            suppression: Arc::new(Suppression::default()),
            check_in_progress: AtomicBool::new(false),
        }
    }

    pub fn is_check_in_progress(&self) -> bool {
        self.check_in_progress.load(Ordering::Acquire)
    }

    pub fn is_suppressing(&self) -> bool {
        self.suppression.is_armed()
    }

    /// Run one detection pass. Never fails: read errors are logged and
    /// reported as `CheckOutcome::Failed` so the caller's loop keeps going.
    pub async fn check(&self) -> CheckOutcome {
        if self
            .check_in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Clipboard check already in progress, skipping");
            return CheckOutcome::Busy;
        }
        let _guard = CheckGuard(&self.check_in_progress);

        match self.run_check().await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Clipboard check error: {}", e);
                CheckOutcome::Failed
            }
        }
    }

    async fn run_check(&self) -> Result<CheckOutcome> {
        let image = match self.clipboard.read_image() {
            Ok(image) => image,
            Err(e) => {
                debug!("Image read failed, falling back to text: {}", e);
                None
            }
        };

        // an image on the clipboard shadows any text alongside it
        if let Some(image) = image.filter(|img| !img.is_empty()) {
            return self.check_image(image).await;
        }

        let text = self.clipboard.read_text()?;
        self.check_text(text).await
    }

    async fn check_image(&self, image: ImagePayload) -> Result<CheckOutcome> {
        let fingerprint = image_fingerprint(&image, self.config.sample_stride);

        {
            let mut state = self.lock_state();
            if state.last_image_fingerprint == fingerprint {
                return Ok(CheckOutcome::Unchanged);
            }
            state.last_image_fingerprint = fingerprint.clone();
        }

        if self.history.read().await.contains_image(&fingerprint) {
            debug!("Image already in history: {}", fingerprint);
            return Ok(CheckOutcome::DuplicateImage);
        }

        let png_bytes = encode_png(&image)?;
        if png_bytes.len() > self.config.max_image_bytes {
            warn!(
                "Skipping clipboard image of {} bytes (limit {})",
                png_bytes.len(),
                self.config.max_image_bytes
            );
            return Ok(CheckOutcome::OversizedImage);
        }

        let entry = ClipboardEntry::new_image(
            fingerprint,
            png_data_url(&png_bytes),
            png_bytes.len(),
            ImageSize {
                width: image.width,
                height: image.height,
            },
        );

        info!(
            "New clipboard image detected: {}x{} ({} bytes)",
            image.width,
            image.height,
            png_bytes.len()
        );
        self.publish(entry.clone()).await;
        Ok(CheckOutcome::Changed(entry))
    }

    async fn check_text(&self, text: String) -> Result<CheckOutcome> {
        {
            let mut state = self.lock_state();
            state.last_image_fingerprint.clear();

            if text.is_empty() {
                return Ok(CheckOutcome::Unchanged);
            }

            // the first look after our own write belongs to that write,
            // whether or not the echo changed the text
            if self.suppression.consume() {
                debug!("Ignoring clipboard change caused by own write");
                state.last_text = text;
                return Ok(CheckOutcome::Suppressed);
            }

            if text == state.last_text {
                return Ok(CheckOutcome::Unchanged);
            }
            state.last_text = text.clone();
        }

        let entry = ClipboardEntry::new_text(text);
        info!(
            "New clipboard content detected: {:?} ({} chars)",
            entry.entry_type, entry.size
        );
        self.publish(entry.clone()).await;
        Ok(CheckOutcome::Changed(entry))
    }

    async fn publish(&self, entry: ClipboardEntry) {
        self.history.write().await.add(entry.clone());

        if self.events.send(ClipboardEvent::Changed(entry)).is_err() {
            debug!("No subscribers for clipboard change");
        }
    }

    /// Current clipboard text, or an empty string when it cannot be read.
    pub fn read_from_clipboard(&self) -> String {
        self.clipboard.read_text().unwrap_or_else(|e| {
            warn!("Failed to read clipboard: {}", e);
            String::new()
        })
    }

    /// Write text without recording it as a new external change.
    ///
    /// The suppression flag is armed before the OS write and `last_text`
    /// updated immediately; a safety timer clears the flag if no check
    /// consumes it within the suppression window.
    pub fn write_to_clipboard(&self, text: &str) -> Result<()> {
        let generation = self.suppression.arm();
        let previous = std::mem::replace(&mut self.lock_state().last_text, text.to_string());

        if let Err(e) = self.clipboard.write_text(text) {
            error!("Failed to write clipboard: {}", e);
            self.suppression.disarm(generation);
            self.lock_state().last_text = previous;
            return Err(e);
        }

        self.schedule_suppression_reset(generation);
        Ok(())
    }

    /// Write an image; the fingerprint is recorded first so the next
    /// check sees it as unchanged.
    pub fn write_image_to_clipboard(&self, image: &ImagePayload) -> Result<()> {
        let fingerprint = image_fingerprint(image, self.config.sample_stride);
        let previous =
            std::mem::replace(&mut self.lock_state().last_image_fingerprint, fingerprint);

        if let Err(e) = self.clipboard.write_image(image) {
            error!("Failed to write image to clipboard: {}", e);
            self.lock_state().last_image_fingerprint = previous;
            return Err(e);
        }
        Ok(())
    }

    fn schedule_suppression_reset(&self, generation: u64) {
        let suppression = Arc::clone(&self.suppression);
        let window = Duration::from_millis(self.config.suppression_window_ms);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(window).await;
                    if suppression.disarm(generation) {
                        debug!("No echo within {:?}, suppression flag cleared", window);
                    }
                });
            }
            Err(_) => {
                warn!("No async runtime available; suppression flag clears on next check only");
            }
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, DetectorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
