use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use core_types::{DEFAULT_GRADIENTS, UiLanguage};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const CURRENT_SCHEMA_VERSION: u32 = 1;

pub const DEFAULT_AUTOSAVE_DEBOUNCE_MS: u64 = 500;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub schema_version: u32,
    #[serde(default = "default_language")]
    pub language: UiLanguage,
    #[serde(default = "default_debounce_ms")]
    pub autosave_debounce_ms: u64,
    /// Save pending keystrokes when leaving the editor instead of dropping them.
    #[serde(default)]
    pub flush_on_exit: bool,
    #[serde(default = "default_database_file")]
    pub database_file: String,
    #[serde(default = "default_gradients")]
    pub gradients: Vec<String>,
}

fn default_language() -> UiLanguage {
    UiLanguage::EnUs
}

const fn default_debounce_ms() -> u64 {
    DEFAULT_AUTOSAVE_DEBOUNCE_MS
}

fn default_database_file() -> String {
    "cards.db".to_string()
}

fn default_gradients() -> Vec<String> {
    DEFAULT_GRADIENTS.iter().map(|g| g.to_string()).collect()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            language: default_language(),
            autosave_debounce_ms: DEFAULT_AUTOSAVE_DEBOUNCE_MS,
            flush_on_exit: false,
            database_file: default_database_file(),
            gradients: default_gradients(),
        }
    }
}

impl AppConfig {
    pub fn autosave_debounce(&self) -> Duration {
        Duration::from_millis(self.autosave_debounce_ms)
    }

    /// Configured palette, or the built-in one when the list is empty.
    pub fn gradient_palette(&self) -> Vec<String> {
        if self.gradients.is_empty() {
            default_gradients()
        } else {
            self.gradients.clone()
        }
    }
}

pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            path: dir.into().join("config.json"),
        }
    }

    pub fn from_default_location() -> Result<Self> {
        let mut dir = dirs::config_dir().context("failed to resolve config_dir")?;
        dir.push("notecards");
        Ok(Self::from_dir(dir))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_or_init(&self) -> Result<AppConfig> {
        if !self.path.exists() {
            let config = AppConfig::default();
            self.save(&config)?;
            return Ok(config);
        }

        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let mut config: AppConfig =
            serde_json::from_str(&raw).context("failed to parse app config json")?;
        self.migrate(&mut config);
        self.save(&config)?;
        Ok(config)
    }

    pub fn save(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let text = serde_json::to_string_pretty(config).context("failed to serialize config")?;
        fs::write(&self.path, text)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }

    fn migrate(&self, config: &mut AppConfig) {
        if config.schema_version >= CURRENT_SCHEMA_VERSION {
            return;
        }

        warn!(
            from = config.schema_version,
            to = CURRENT_SCHEMA_VERSION,
            "migrating app config schema"
        );

        if config.gradients.is_empty() {
            config.gradients = default_gradients();
        }
        if config.autosave_debounce_ms == 0 {
            config.autosave_debounce_ms = DEFAULT_AUTOSAVE_DEBOUNCE_MS;
        }
        config.schema_version = CURRENT_SCHEMA_VERSION;
    }
}
