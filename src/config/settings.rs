use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::context::PrepareOptions;
use crate::benchmark::BenchmarkOptions;
use crate::errors::{Result, VaultError};
use crate::store::FileStore;

/// Project-level configuration, loaded from `.hdvault.toml`.
///
/// Every field has a sensible default so hdvault works out-of-the-box
/// without any config file at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Directory (relative to project root) holding the key and vault stores.
    #[serde(default = "default_store_dir")]
    pub store_dir: String,

    /// How long one password derivation should take (default: 1 s).
    #[serde(default = "default_kdf_target_time_ms")]
    pub kdf_target_time_ms: f64,

    /// Argon2 memory cost in KiB used for calibration (default: 32 MB).
    #[serde(default = "default_kdf_memory_kib")]
    pub kdf_memory_kib: u32,

    /// Argon2 parallelism degree (default: 1).
    #[serde(default = "default_kdf_parallelism")]
    pub kdf_parallelism: u32,
}

// ── Serde default helpers ────────────────────────────────────────────

fn default_store_dir() -> String {
    ".hdvault".to_string()
}

fn default_kdf_target_time_ms() -> f64 {
    1000.0
}

fn default_kdf_memory_kib() -> u32 {
    32_768 // 32 MB
}

fn default_kdf_parallelism() -> u32 {
    1
}

// ── Implementation ───────────────────────────────────────────────────

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_dir: default_store_dir(),
            kdf_target_time_ms: default_kdf_target_time_ms(),
            kdf_memory_kib: default_kdf_memory_kib(),
            kdf_parallelism: default_kdf_parallelism(),
        }
    }
}

impl Settings {
    /// Name of the config file we look for in the project root.
    const FILE_NAME: &'static str = ".hdvault.toml";

    /// Load settings from `<project_dir>/.hdvault.toml`.
    ///
    /// If the file does not exist, sensible defaults are returned.
    /// If the file exists but cannot be parsed, an error is returned.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let config_path = project_dir.join(Self::FILE_NAME);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path)?;

        let settings: Settings = toml::from_str(&contents).map_err(|e| {
            VaultError::Configuration(format!("Failed to parse {}: {e}", config_path.display()))
        })?;

        Ok(settings)
    }

    /// Root of the on-disk stores, e.g. `project_dir/.hdvault`.
    pub fn store_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.store_dir)
    }

    /// Calibration target for new default KDF parameters.
    pub fn calibration(&self) -> BenchmarkOptions {
        BenchmarkOptions {
            target_time_ms: self.kdf_target_time_ms,
            memory_kib: self.kdf_memory_kib,
            parallelism: self.kdf_parallelism,
            measure_error: false,
        }
    }

    /// File-backed `prepare()` options: `<store>/keys` and `<store>/vaults`.
    pub fn prepare_options(&self, project_dir: &Path) -> Result<PrepareOptions> {
        let root = self.store_path(project_dir);
        let key_store = FileStore::open(&root.join("keys"))?;
        let vault_store = FileStore::open(&root.join("vaults"))?;

        Ok(PrepareOptions {
            key_store: Some(Arc::new(key_store)),
            vault_store: Some(Arc::new(vault_store)),
            calibration: Some(self.calibration()),
            ..PrepareOptions::default()
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────────
