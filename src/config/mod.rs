//! Configuration module for session replay
//!
//! This module handles configuration of the recorder, the player and the
//! persistent store. Configuration is read from a TOML file; every field has
//! a default, so a partial (or missing) file is valid.
//!
//! # Config Location
//!
//! Configuration is stored in the platform-appropriate location:
//! - **Linux**: `~/.config/dev.hxyulin.session-replay/config.toml`
//! - **macOS**: `~/Library/Application Support/dev.hxyulin.session-replay/config.toml`
//! - **Windows**: `%APPDATA%\dev.hxyulin.session-replay\config.toml`
//!
//! The `SESSION_REPLAY_CONFIG` environment variable overrides the path.
//!
//! # Example
//!
//! ```toml
//! [recorder]
//! flush_interval_ms = 2000
//!
//! [player]
//! loop_playback = true
//! ```

use crate::error::{ReplayError, Result};
use crate::types::Millis;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for config and data directories
pub const APP_ID: &str = "dev.hxyulin.session-replay";

/// Config filename
pub const CONFIG_FILE: &str = "config.toml";

/// Environment variable overriding the config path
pub const CONFIG_ENV_VAR: &str = "SESSION_REPLAY_CONFIG";

/// Default flush interval for buffered events
pub const DEFAULT_FLUSH_INTERVAL_MS: Millis = 5000;

/// Minimum spacing between sampled pointer movements
pub const DEFAULT_CURSOR_SAMPLE_MS: Millis = 100;

/// Minimum spacing between sampled scroll events
pub const DEFAULT_SCROLL_SAMPLE_MS: Millis = 200;

/// Buffer size that triggers an early flush attempt
pub const DEFAULT_MAX_BUFFERED_EVENTS: usize = 500;

/// Playback tick cadence (display refresh rate)
pub const DEFAULT_TICK_INTERVAL_MS: Millis = 16;

// ==================== Directories ====================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Default config file path, honouring the environment override
pub fn config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    config_dir().map(|p| p.join(CONFIG_FILE))
}

// ==================== Sections ====================

/// Recorder settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Interval between durable flushes
    pub flush_interval_ms: Millis,
    /// Pointer movements arriving sooner than this after the last one are discarded
    pub cursor_sample_ms: Millis,
    /// Scroll events arriving sooner than this after the last one are discarded
    pub scroll_sample_ms: Millis,
    /// Buffered events that trigger an early flush (0 = only on schedule)
    pub max_buffered_events: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
            cursor_sample_ms: DEFAULT_CURSOR_SAMPLE_MS,
            scroll_sample_ms: DEFAULT_SCROLL_SAMPLE_MS,
            max_buffered_events: DEFAULT_MAX_BUFFERED_EVENTS,
        }
    }
}

/// Player settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Tick cadence while playing
    pub tick_interval_ms: Millis,
    /// Initial playback speed
    pub default_speed: f64,
    /// Lowest accepted speed
    pub min_speed: f64,
    /// Highest accepted speed
    pub max_speed: f64,
    /// Restart from the beginning when the end is reached
    pub loop_playback: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            default_speed: 1.0,
            min_speed: 0.1,
            max_speed: 16.0,
            loop_playback: false,
        }
    }
}

/// Store settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory for the file-backed store
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

impl StoreConfig {
    /// Resolve the store directory
    pub fn resolve_data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        app_data_dir()
            .map(|p| p.join("store"))
            .ok_or_else(|| ReplayError::Config("Could not determine app data directory".to_string()))
    }
}

// ==================== Replay Config ====================

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    pub recorder: RecorderConfig,
    pub player: PlayerConfig,
    pub store: StoreConfig,
}

impl ReplayConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ReplayError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ReplayError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load from the default location; a missing file yields defaults
    pub fn load() -> Result<Self> {
        let path = config_path().ok_or_else(|| {
            ReplayError::Config("Could not determine config path".to_string())
        })?;

        if !path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load config, returning defaults on any error
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save to an explicit path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| ReplayError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)
            .map_err(|e| ReplayError::Config(format!("Failed to write config: {}", e)))
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        let player = &self.player;
        if player.min_speed <= 0.0 || player.min_speed > player.max_speed {
            return Err(ReplayError::Config(format!(
                "Invalid speed range [{}, {}]",
                player.min_speed, player.max_speed
            )));
        }
        if player.default_speed < player.min_speed || player.default_speed > player.max_speed {
            return Err(ReplayError::Config(format!(
                "Default speed {} outside [{}, {}]",
                player.default_speed, player.min_speed, player.max_speed
            )));
        }
        if player.tick_interval_ms == 0 || self.recorder.flush_interval_ms == 0 {
            return Err(ReplayError::Config(
                "Timer intervals must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
