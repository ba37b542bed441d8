//! Player configuration
//!
//! Stored as YAML in the Apollon config directory.
//! Default location: ~/.config/apollon/player.yaml

use std::path::{Path, PathBuf};

use apollon_core::audio::AudioConfig;
use apollon_core::config::{default_config_path, load_config, save_config};
use apollon_core::control::PlaybackOptions;
use apollon_core::waveform::DEFAULT_WINDOW_SIZES;
use serde::{Deserialize, Serialize};

/// Config file name inside the Apollon config directory
pub const CONFIG_FILE: &str = "player.yaml";

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Output device, sample rate and buffer size
    pub audio: AudioConfig,
    /// Behaviour after a file loads
    pub playback: PlaybackOptions,
    pub waveform: WaveformConfig,
    /// Directory of the last loaded file, used for relative paths
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_directory: Option<PathBuf>,
}

/// Waveform summary section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveformConfig {
    /// Zoom levels in frames per peak
    pub window_sizes: Vec<usize>,
}

impl Default for WaveformConfig {
    fn default() -> Self {
        Self {
            window_sizes: DEFAULT_WINDOW_SIZES.to_vec(),
        }
    }
}

impl PlayerConfig {
    pub fn default_path() -> PathBuf {
        default_config_path(CONFIG_FILE)
    }

    pub fn load(path: &Path) -> Self {
        let config: Self = load_config(path);
        log::info!(
            "Player config: device {}, loop on load {}, autoplay {}",
            config
                .audio
                .device
                .as_ref()
                .map_or_else(|| "default".to_string(), |d| d.display_label()),
            config.playback.loop_on_load,
            config.playback.autoplay_on_load
        );
        config
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        save_config(self, path)
    }

    /// Resolve a user-typed path against the last used directory
    pub fn resolve_path(&self, input: &str) -> PathBuf {
        let path = PathBuf::from(input);
        match &self.last_directory {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path,
        }
    }

    /// Remember the directory of a successfully loaded file
    pub fn remember_directory(&mut self, file: &Path) -> bool {
        let Some(dir) = file.parent().filter(|d| !d.as_os_str().is_empty()) else {
            return false;
        };
        if self.last_directory.as_deref() == Some(dir) {
            return false;
        }
        self.last_directory = Some(dir.to_path_buf());
        true
    }
}
