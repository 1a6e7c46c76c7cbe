use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::clipboard::detector::DetectorConfig;
use crate::clipboard::scheduler::SchedulerConfig;
use crate::control::ControlConfig;
use crate::history::HistoryConfig;
use crate::storage::StorageConfig;
use crate::{ClipdeckError, Result};

/// Everything the daemon needs, built once and handed to each component.
/// Every field has a default, so a config file only lists overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub detector: DetectorConfig,
    pub scheduler: SchedulerConfig,
    pub history: HistoryConfig,
    pub storage: StorageConfig,
    pub control: ControlConfig,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ClipdeckError::Config(format!("Cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| ClipdeckError::Config(format!("Invalid config: {e}")))
    }
}
