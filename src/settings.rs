//! Settings - key/value persistence for UI preferences
//!
//! The coordination core never persists anything; host code loads
//! preferences at startup and saves them when the relevant state keys
//! change. Backed by one JSON file in the platform config dir.

use anyhow::Context;
use serde_json::Value;
use std::path::PathBuf;
use tracing::debug;

/// Key/value settings persistence consumed by host code.
pub trait SettingsService: Send + Sync {
    /// Load one value; `None` when never saved.
    fn load(&self, key: &str) -> Option<Value>;

    /// Save one value.
    fn save(&self, key: &str, value: Value) -> anyhow::Result<()>;
}

/// Settings stored as one JSON object in a file.
pub struct JsonFileSettings {
    path: PathBuf,
}

impl JsonFileSettings {
    /// Settings file at an explicit path.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Settings file in the platform config dir.
    pub fn in_config_dir() -> anyhow::Result<Self> {
        let dir = dirs::config_dir()
            .context("no platform config dir")?
            .join("atelier");
        Ok(Self::new(dir.join("settings.json")))
    }

    fn read_all(&self) -> serde_json::Map<String, Value> {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }
}

impl SettingsService for JsonFileSettings {
    fn load(&self, key: &str) -> Option<Value> {
        self.read_all().get(key).cloned()
    }

    fn save(&self, key: &str, value: Value) -> anyhow::Result<()> {
        let mut all = self.read_all();
        all.insert(key.to_string(), value);
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&all)?)
            .with_context(|| format!("writing {}", self.path.display()))?;
        debug!(key, "setting saved");
        Ok(())
    }
}
