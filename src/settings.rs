//! User settings persisted as TOML

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::host::ChannelOptions;

const APP_DIR: &str = "chhobi";
const SETTINGS_FILE: &str = "settings.toml";

/// Errors loading or saving settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("No configuration directory available on this system")]
    NoConfigDir,

    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid settings in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// exiftool binary; looked up in PATH when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exiftool_path: Option<PathBuf>,

    /// Seconds to wait for one worker response; 0 waits forever
    pub response_timeout_secs: u64,

    /// Seconds to wait for the worker to exit before killing it
    pub shutdown_timeout_secs: u64,

    /// Log worker diagnostics instead of discarding them
    pub capture_stderr: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            exiftool_path: None,
            response_timeout_secs: 30,
            shutdown_timeout_secs: 5,
            capture_stderr: true,
        }
    }
}

impl Settings {
    /// Default settings file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(SETTINGS_FILE))
    }

    /// Load from the default location, falling back to defaults when absent
    pub fn load() -> Result<Self, SettingsError> {
        let path = Self::default_path().ok_or(SettingsError::NoConfigDir)?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No settings file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(SettingsError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        toml::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        let content = toml::to_string_pretty(self)?;
        let io_err = |source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(path, content).map_err(io_err)
    }

    /// Worker launch options derived from these settings
    pub fn channel_options(&self) -> ChannelOptions {
        let response_timeout =
            (self.response_timeout_secs > 0).then(|| Duration::from_secs(self.response_timeout_secs));
        let mut options = ChannelOptions::exiftool()
            .with_response_timeout(response_timeout)
            .with_shutdown_timeout(Duration::from_secs(self.shutdown_timeout_secs));
        if let Some(path) = &self.exiftool_path {
            options = options.with_program(path);
        }
        options.capture_stderr = self.capture_stderr;
        options
    }
}
