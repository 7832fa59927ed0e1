//! Engine Settings
//!
//! Provides the service configuration with:
//! - Tolerant JSON loading (unknown fields ignored, missing fields defaulted)
//! - Normalization so out-of-range values never reach the store or pipeline
//! - Environment overrides for deployment
//!
//! Storage location: any JSON file passed to [`EngineSettings::load_from_file`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::{CoreError, CoreResult};

/// Default database file name inside the data directory
pub const DATABASE_FILE: &str = "db.json";

/// Environment variable overriding `dataDir`
pub const ENV_DATA_DIR: &str = "CLIPSHARE_DATA_DIR";

/// Environment variable overriding `ffmpegPath`
pub const ENV_FFMPEG_PATH: &str = "CLIPSHARE_FFMPEG_PATH";

/// How the store reacts to a database file it cannot parse
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum CorruptionPolicy {
    /// Quarantine the bad file, log, and continue with an empty library
    #[default]
    FailOpen,
    /// Surface `CoreError::StoreCorrupted` and leave the file untouched
    Refuse,
}

/// Service settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EngineSettings {
    /// Directory holding the metadata database
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Database file name inside `data_dir`
    #[serde(default = "default_database_file")]
    pub database_file: String,

    /// Directory where uploaded media is stored
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: PathBuf,

    /// Reaction to an unreadable database file
    #[serde(default)]
    pub corruption_policy: CorruptionPolicy,

    /// Explicit FFmpeg binary; detected on PATH when absent
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Upper bound on a single trim invocation
    #[serde(default = "default_trim_timeout_secs")]
    pub trim_timeout_secs: u64,

    /// Scratch directory for trim inputs/outputs; OS temp dir when absent
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,

    /// Container extension used for uploads and trim scratch files
    #[serde(default = "default_media_extension")]
    pub media_extension: String,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_database_file() -> String {
    DATABASE_FILE.to_string()
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("public").join("uploads")
}

fn default_trim_timeout_secs() -> u64 {
    120
}

fn default_media_extension() -> String {
    "webm".to_string()
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database_file: default_database_file(),
            uploads_dir: default_uploads_dir(),
            corruption_policy: CorruptionPolicy::default(),
            ffmpeg_path: None,
            trim_timeout_secs: default_trim_timeout_secs(),
            temp_dir: None,
            media_extension: default_media_extension(),
        }
    }
}

impl EngineSettings {
    /// Load settings from a JSON file.
    ///
    /// A missing file yields defaults. A file that exists but does not parse
    /// is an error.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            info!("Settings file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let mut settings: Self =
            serde_json::from_str(&content).map_err(|e| CoreError::InvalidSettings {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        settings.normalize();
        Ok(settings)
    }

    /// Apply `CLIPSHARE_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup(ENV_DATA_DIR).filter(|v| !v.trim().is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup(ENV_FFMPEG_PATH).filter(|v| !v.trim().is_empty()) {
            self.ffmpeg_path = Some(PathBuf::from(path));
        }
    }

    /// Normalizes settings so downstream components always see valid values.
    ///
    /// Bad values are corrected rather than rejected.
    pub fn normalize(&mut self) {
        self.trim_timeout_secs = self.trim_timeout_secs.clamp(1, 3600);

        let name = self.database_file.trim().to_string();
        if crate::core::fs::validate_path_id_component(&name, "databaseFile").is_err() {
            warn!(
                "Invalid databaseFile {:?}, falling back to {}",
                self.database_file, DATABASE_FILE
            );
            self.database_file = default_database_file();
        } else {
            self.database_file = name;
        }

        let ext = self.media_extension.trim().trim_start_matches('.');
        if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            self.media_extension = default_media_extension();
        } else {
            self.media_extension = ext.to_ascii_lowercase();
        }
    }

    /// Full path of the metadata database
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }

    /// Directory used for trim scratch files
    pub fn scratch_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Timeout applied to each trim invocation
    pub fn trim_timeout(&self) -> Duration {
        Duration::from_secs(self.trim_timeout_secs)
    }
}
