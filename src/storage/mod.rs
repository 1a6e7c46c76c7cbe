use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{ClipdeckError, Result};

pub const CLIPBOARD_HISTORY: &str = "clipboard-history";
pub const TODOS: &str = "todos";
pub const NOTES: &str = "notes";

pub const STORAGE_VERSION: u32 = 1;

const BACKUP_DIR_NAME: &str = "backups";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub max_backups: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(crate::APP_DIR_NAME);

        Self {
            data_dir,
            max_backups: 10,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub version: u32,
    pub timestamp: DateTime<Utc>,
    pub items: Vec<T>,
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    version: u32,
    timestamp: DateTime<Utc>,
    items: &'a [T],
}

/// JSON file store, one file per category, with rotating backups.
pub struct Storage {
    config: StorageConfig,
    backup_seq: AtomicU64,
    write_lock: Mutex<()>,
}

impl Storage {
    pub async fn new(config: StorageConfig) -> Result<Self> {
        fs::create_dir_all(&config.data_dir).await?;

        Ok(Self {
            config,
            backup_seq: AtomicU64::new(0),
            write_lock: Mutex::new(()),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    fn category_path(&self, category: &str) -> PathBuf {
        self.config.data_dir.join(format!("{category}.json"))
    }

    fn backup_dir(&self) -> PathBuf {
        self.config.data_dir.join(BACKUP_DIR_NAME)
    }

    /// Replace the stored items of a category. The previous file, if any,
    /// is kept as a timestamped backup first.
    pub async fn save<T: Serialize>(&self, category: &str, items: &[T]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.category_path(category);

        if fs::try_exists(&path).await? {
            self.backup(category, &path).await?;
        }

        let envelope = EnvelopeRef {
            version: STORAGE_VERSION,
            timestamp: Utc::now(),
            items,
        };
        let json = serde_json::to_vec_pretty(&envelope)?;

        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, &json).await?;
        fs::rename(&tmp_path, &path).await?;

        debug!("Saved {} {} item(s) to {}", items.len(), category, path.display());
        Ok(())
    }

    /// Load a category. Missing data is an empty list; an unreadable file
    /// falls back to the newest readable backup.
    pub async fn load<T: DeserializeOwned>(&self, category: &str) -> Result<Vec<T>> {
        let path = self.category_path(category);
        if !fs::try_exists(&path).await? {
            return Ok(Vec::new());
        }

        let err = match read_items(&path).await {
            Ok(items) => return Ok(items),
            Err(e) => e,
        };
        warn!("Failed to read {}: {}", path.display(), err);

        for backup in self.list_backups(category).await? {
            match read_items(&backup).await {
                Ok(items) => {
                    info!("Recovered {} from backup {}", category, backup.display());
                    return Ok(items);
                }
                Err(e) => warn!("Skipping unreadable backup {}: {}", backup.display(), e),
            }
        }

        Err(ClipdeckError::Storage(format!(
            "No readable data for {category}: {err}"
        )))
    }

    /// Backups of a category, newest first.
    pub async fn list_backups(&self, category: &str) -> Result<Vec<PathBuf>> {
        let dir = self.backup_dir();
        if !fs::try_exists(&dir).await? {
            return Ok(Vec::new());
        }

        let prefix = format!("{category}-");
        let mut backups = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_match = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|name| name.strip_prefix(&prefix))
                .is_some_and(|rest| {
                    rest.starts_with(|c: char| c.is_ascii_digit()) && rest.ends_with(".json")
                });
            if is_match {
                backups.push(path);
            }
        }

        // names embed a fixed-width timestamp and sequence, so they sort by age
        backups.sort();
        backups.reverse();
        Ok(backups)
    }

    async fn backup(&self, category: &str, path: &Path) -> Result<()> {
        let dir = self.backup_dir();
        fs::create_dir_all(&dir).await?;

        let seq = self.backup_seq.fetch_add(1, Ordering::SeqCst);
        let name = format!(
            "{}-{}-{:06}.json",
            category,
            Utc::now().format("%Y%m%d-%H%M%S%.3f"),
            seq
        );
        fs::copy(path, dir.join(&name)).await?;

        self.prune_backups(category).await
    }

    async fn prune_backups(&self, category: &str) -> Result<()> {
        let backups = self.list_backups(category).await?;

        for path in backups.into_iter().skip(self.config.max_backups) {
            if let Err(e) = fs::remove_file(&path).await {
                warn!("Failed to remove old backup: {}", e);
            } else {
                debug!("Removed old backup: {}", path.display());
            }
        }

        Ok(())
    }
}

async fn read_items<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let raw = fs::read(path).await?;
    let value: serde_json::Value = serde_json::from_slice(&raw)?;

    // files written before the envelope existed hold a bare array
    if value.is_array() {
        return Ok(serde_json::from_value(value)?);
    }

    let envelope: Envelope<T> = serde_json::from_value(value)?;
    if envelope.version > STORAGE_VERSION {
        warn!(
            "{} was written by a newer version ({}), reading best-effort",
            path.display(),
            envelope.version
        );
    }
    Ok(envelope.items)
}
