pub mod classifier;
pub mod detector;
pub mod entry;
pub mod fingerprint;
pub mod processor;
pub mod scheduler;

use arboard::{Clipboard as Arboard, ImageData};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::{ClipdeckError, Result};

pub use classifier::{classify, Classification};
pub use entry::{ClipboardEntry, EntryType, ImageSize};

/// Raw RGBA pixels as handed over by the platform clipboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub width: usize,
    pub height: usize,
    pub bytes: Vec<u8>,
}

impl ImagePayload {
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty() || self.width == 0 || self.height == 0
    }
}

/// Access to the system clipboard.
///
/// The clipboard is shared with every other process on the machine, so
/// callers must expect arbitrary changes between any two reads. An empty
/// clipboard is not an error: `read_text` yields an empty string and
/// `read_image` yields `None`.
pub trait ClipboardBackend: Send + Sync {
    fn read_text(&self) -> Result<String>;

    fn read_image(&self) -> Result<Option<ImagePayload>>;

    fn write_text(&self, text: &str) -> Result<()>;

    fn write_image(&self, image: &ImagePayload) -> Result<()>;
}

/// OS clipboard backed by `arboard`.
pub struct SystemClipboard {
    clipboard: Arc<Mutex<Arboard>>,
}

impl SystemClipboard {
    pub fn new() -> Result<Self> {
        let clipboard = Arboard::new().map_err(|e| ClipdeckError::Clipboard(e.to_string()))?;

        Ok(Self {
            clipboard: Arc::new(Mutex::new(clipboard)),
        })
    }

    fn with_clipboard<T>(&self, f: impl FnOnce(&mut Arboard) -> Result<T>) -> Result<T> {
        let mut clipboard = self
            .clipboard
            .lock()
            .map_err(|e| ClipdeckError::Clipboard(format!("Lock error: {e}")))?;
        f(&mut clipboard)
    }
}

impl ClipboardBackend for SystemClipboard {
    fn read_text(&self) -> Result<String> {
        self.with_clipboard(|clipboard| match clipboard.get_text() {
            Ok(text) => Ok(text),
            Err(arboard::Error::ContentNotAvailable) => Ok(String::new()),
            Err(e) => Err(ClipdeckError::Clipboard(e.to_string())),
        })
    }

    fn read_image(&self) -> Result<Option<ImagePayload>> {
        self.with_clipboard(|clipboard| match clipboard.get_image() {
            Ok(image) => Ok(Some(ImagePayload {
                width: image.width,
                height: image.height,
                bytes: image.bytes.into_owned(),
            })),
            Err(arboard::Error::ContentNotAvailable) => Ok(None),
            Err(e) => Err(ClipdeckError::Clipboard(e.to_string())),
        })
    }

    fn write_text(&self, text: &str) -> Result<()> {
        self.with_clipboard(|clipboard| {
            clipboard
                .set_text(text)
                .map_err(|e| ClipdeckError::Clipboard(e.to_string()))
        })
    }

    fn write_image(&self, image: &ImagePayload) -> Result<()> {
        let image_data = ImageData {
            width: image.width,
            height: image.height,
            bytes: image.bytes.as_slice().into(),
        };

        self.with_clipboard(|clipboard| {
            clipboard
                .set_image(image_data)
                .map_err(|e| ClipdeckError::Clipboard(e.to_string()))
        })
    }
}

#[derive(Debug, Default)]
struct MemoryContents {
    text: String,
    image: Option<ImagePayload>,
}

/// In-process clipboard for headless hosts and tests.
///
/// Writing one format replaces the other, the same way the OS clipboard
/// drops an image when text is copied.
#[derive(Debug, Default)]
pub struct MemoryClipboard {
    contents: Mutex<MemoryContents>,
    image_reads: AtomicUsize,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of image reads so far. Every detection check starts with one.
    pub fn image_reads(&self) -> usize {
        self.image_reads.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        let mut contents = self.contents.lock().unwrap_or_else(PoisonError::into_inner);
        *contents = MemoryContents::default();
    }
}

impl ClipboardBackend for MemoryClipboard {
    fn read_text(&self) -> Result<String> {
        let contents = self.contents.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(contents.text.clone())
    }

    fn read_image(&self) -> Result<Option<ImagePayload>> {
        self.image_reads.fetch_add(1, Ordering::SeqCst);
        let contents = self.contents.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(contents.image.clone())
    }

    fn write_text(&self, text: &str) -> Result<()> {
        let mut contents = self.contents.lock().unwrap_or_else(PoisonError::into_inner);
        contents.text = text.to_string();
        contents.image = None;
        Ok(())
    }

    fn write_image(&self, image: &ImagePayload) -> Result<()> {
        let mut contents = self.contents.lock().unwrap_or_else(PoisonError::into_inner);
        contents.text.clear();
        contents.image = Some(image.clone());
        Ok(())
    }
}
