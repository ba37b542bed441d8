//! Configuration files for Apollon
//!
//! YAML load/save for any serde type plus the standard config location.
//! Each binary defines its own config struct and uses these helpers.
//!
//! ```ignore
//! use apollon_core::config::{default_config_path, load_config, save_config};
//!
//! let path = default_config_path("player.yaml");
//! let config: PlayerConfig = load_config(&path);
//! save_config(&config, &path)?;
//! ```

mod io;
mod paths;

pub use io::{load_config, save_config};
pub use paths::{config_dir, default_config_path};
