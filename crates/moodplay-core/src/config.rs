//! Engine configuration.
//!
//! A JSON file with every field optional. Resolution order:
//! `$MOODPLAY_CONFIG`, then `~/.moodplay/config.json`, then defaults.
//! `$MOODPLAY_MUSIC_ROOT` overrides the music root last.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backend::stream::StreamSettings;
use crate::error::{PlaybackError, Result};
use crate::paths;

/// Smallest accepted decode chunk. Keeps the worker from spinning on
/// per-frame writes.
const MIN_CHUNK_BYTES: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Folder holding one sub-folder per mood.
    pub music_root: PathBuf,
    /// Volume level (0-100) applied before the first `set_volume`.
    pub initial_volume: u8,
    /// Exponent of the level-to-gain curve.
    pub volume_exponent: f32,
    /// Decoded PCM bytes written per streaming iteration.
    pub chunk_bytes: usize,
    /// Upper bound on how long a paused worker sleeps between flag checks.
    pub pause_poll_ms: u64,
    /// How long teardown waits for the streaming worker to exit.
    pub teardown_timeout_ms: u64,
    /// ProgressTracker sampling period.
    pub progress_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            music_root: PathBuf::from(paths::DEFAULT_MUSIC_DIR),
            initial_volume: 80,
            volume_exponent: crate::volume::DEFAULT_EXPONENT,
            chunk_bytes: 4096,
            pause_poll_ms: 50,
            teardown_timeout_ms: 500,
            progress_interval_ms: 200,
        }
    }
}

impl EngineConfig {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| PlaybackError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve config from the environment.
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var_os(paths::CONFIG_ENV) {
            Some(path) => Self::load(Path::new(&path))?,
            None => {
                let default = paths::default_config_path();
                if default.is_file() {
                    Self::load(&default)?
                } else {
                    log::debug!("moodplay: no config at {}, using defaults", default.display());
                    Self::default()
                }
            }
        };
        if let Some(root) = std::env::var_os(paths::MUSIC_ROOT_ENV) {
            config.music_root = PathBuf::from(root);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.initial_volume > 100 {
            return Err(PlaybackError::Config(format!(
                "initial_volume must be 0-100, got {}",
                self.initial_volume
            )));
        }
        if !(self.volume_exponent.is_finite() && self.volume_exponent > 0.0) {
            return Err(PlaybackError::Config(format!(
                "volume_exponent must be positive, got {}",
                self.volume_exponent
            )));
        }
        if self.chunk_bytes < MIN_CHUNK_BYTES {
            return Err(PlaybackError::Config(format!(
                "chunk_bytes must be at least {}, got {}",
                MIN_CHUNK_BYTES, self.chunk_bytes
            )));
        }
        if self.pause_poll_ms == 0 || self.teardown_timeout_ms == 0 || self.progress_interval_ms == 0 {
            return Err(PlaybackError::Config("intervals must be non-zero".into()));
        }
        Ok(())
    }

    pub fn stream_settings(&self) -> StreamSettings {
        StreamSettings {
            chunk_bytes: self.chunk_bytes,
            pause_poll: Duration::from_millis(self.pause_poll_ms),
            teardown_timeout: Duration::from_millis(self.teardown_timeout_ms),
        }
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}
