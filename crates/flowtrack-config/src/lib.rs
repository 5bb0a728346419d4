//! Configuration system for flowtrack.
//!
//! Provides TOML-based configuration with:
//! - A `[session]` section mapping onto the session cache settings
//! - A `[logging]` section for the optional JSON log file
//! - Config file discovery (explicit path, `FLOWTRACK_CONFIG`, XDG user config)

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    LoadedConfig, load_config, load_config_file, save_config, xdg_config_dir, xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
