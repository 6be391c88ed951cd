use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable that relocates the whole data root (users + backups).
pub const DATA_DIR_ENV: &str = "HESTIA_DATA_DIR";

// ── Storage config ───────────────────────────────────────────────────────────

/// Where profile data lives on disk.
///
/// | Key          | Meaning                                                  |
/// |--------------|----------------------------------------------------------|
/// | `root`       | Data root; every other path is resolved against it.      |
/// | `users_dir`  | One sub-directory per profile id holding `userdata.json`. |
/// | `backup_dir` | Shared directory of `{id}_{millis}.json` rolling backups. |
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub root: String,
    pub users_dir: String,
    pub backup_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: ".hestia".to_string(),
            users_dir: "users".to_string(),
            backup_dir: "backups".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn users_path(&self) -> PathBuf {
        Path::new(&self.root).join(&self.users_dir)
    }

    pub fn backup_path(&self) -> PathBuf {
        Path::new(&self.root).join(&self.backup_dir)
    }
}

// ── Validation config ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Upper bound on self-healing passes before a profile is declared
    /// unrecoverable and handed to corruption recovery.
    pub max_attempts: usize,
    /// Run the validate/heal/recover sweep over every profile on start.
    pub sweep_on_start: bool,
    /// Delete backups whose profile id no longer exists after the sweep.
    pub prune_orphan_backups: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            sweep_on_start: true,
            prune_orphan_backups: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub validation: ValidationConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = Self::default();
        if let Ok(raw) = fs::read_to_string(path) {
            config = toml::from_str(&raw)
                .with_context(|| format!("parse config {}", path.display()))?;
        }

        if let Ok(value) = env::var(DATA_DIR_ENV) {
            if !value.is_empty() {
                config.storage.root = value;
            }
        }

        Ok(config)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
