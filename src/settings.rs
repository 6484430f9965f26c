use crate::errors::{FilterError, Result};
use crate::filters::FilterKind;
use crate::image_loader::LoadLimits;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Upper bound offered for the worker count; the engine itself only rejects zero.
pub const MAX_WORKERS: u32 = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Processing
    pub worker_count: u32,
    pub filter: FilterKind,

    // Input limits
    pub max_file_size_mb: u64,
    pub max_megapixels: u64,

    // Export
    pub jpeg_quality: u8,
    pub output_suffix: String,

    pub debug_logging: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            worker_count: num_cpus::get() as u32,
            filter: FilterKind::default(),

            max_file_size_mb: 100,
            max_megapixels: 100,

            jpeg_quality: 90,
            output_suffix: "_processed".to_string(),

            debug_logging: false,
        }
    }
}

impl Settings {
    pub fn config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "bandfilter", "BandFilter")
            .map(|dirs| dirs.config_dir().join("settings.json"))
    }

    /// Settings from the platform config directory, or defaults if there is
    /// no readable file.
    pub fn load() -> Self {
        if let Some(config_path) = Self::config_path() {
            if config_path.exists() {
                match Self::load_from(&config_path) {
                    Ok(settings) => return settings,
                    Err(e) => tracing::warn!(path = %config_path.display(), error = %e, "ignoring settings file"),
                }
            }
        }
        Self::default()
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| FilterError::SettingsError {
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self) -> Result<PathBuf> {
        let config_path = Self::config_path().ok_or_else(|| FilterError::SettingsError {
            message: "no config directory on this platform".to_string(),
        })?;
        self.save_to(&config_path)?;
        Ok(config_path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Worker count clamped to `1..=MAX_WORKERS`.
    pub fn worker_count(&self) -> u32 {
        self.worker_count.clamp(1, MAX_WORKERS)
    }

    pub fn load_limits(&self) -> LoadLimits {
        LoadLimits {
            max_file_size_mb: self.max_file_size_mb,
            max_megapixels: self.max_megapixels,
        }
    }
}
