//! Standard locations for Apollon configuration files

use std::path::PathBuf;

/// Directory name under the platform config directory
const APP_DIR: &str = "apollon";

/// Apollon's configuration directory
///
/// `$XDG_CONFIG_HOME/apollon` on Linux, `~/Library/Application Support/apollon`
/// on macOS, `%APPDATA%\apollon` on Windows. Falls back to `./apollon` when
/// the platform directory is unknown.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Path of a config file inside `config_dir()`
pub fn default_config_path(filename: &str) -> PathBuf {
    config_dir().join(filename)
}
