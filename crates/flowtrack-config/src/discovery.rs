//! Config file discovery.
//!
//! Configs are layered, lowest priority first:
//! 1. Built-in defaults
//! 2. `~/.config/flowtrack/flowtrack.toml` (XDG user config)
//! 3. An explicit path (e.g. `--config`), or else the `FLOWTRACK_CONFIG`
//!    environment variable
//!
//! Each layer replaces whole sections of the one below it. A path named by
//! layer 3 must exist; the XDG file is optional.

use std::path::{Path, PathBuf};

use crate::{ConfigError, FlowtrackConfig, Result};

/// Default config filename within the XDG config directory.
const USER_CONFIG_FILE: &str = "flowtrack.toml";

/// Application name for XDG directory resolution.
const APP_NAME: &str = "flowtrack";

/// Environment variable naming a config file.
const CONFIG_FILE_ENV: &str = "FLOWTRACK_CONFIG";

/// Result of config discovery and loading.
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    /// The merged configuration.
    pub config: FlowtrackConfig,
    /// Files that were loaded, lowest priority first.
    pub sources: Vec<PathBuf>,
    /// Highest-priority file loaded, `None` when using defaults.
    pub source: Option<PathBuf>,
}

/// Load and merge every available config layer.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    let from_env = std::env::var(CONFIG_FILE_ENV)
        .ok()
        .filter(|p| !p.is_empty())
        .map(PathBuf::from);
    load_config_from(explicit, from_env.as_deref(), xdg_config_path().as_deref())
}

/// Discovery with every location supplied by the caller.
fn load_config_from(
    explicit: Option<&Path>,
    from_env: Option<&Path>,
    user_path: Option<&Path>,
) -> Result<LoadedConfig> {
    let mut loaded = LoadedConfig::default();

    if let Some(path) = user_path
        && path.is_file()
    {
        load_layer(&mut loaded, path)?;
    }

    if let Some(path) = explicit.or(from_env) {
        load_layer(&mut loaded, path)?;
    }

    Ok(loaded)
}

/// Load a config file and merge it over what has been loaded so far.
fn load_layer(loaded: &mut LoadedConfig, path: &Path) -> Result<()> {
    let layer = load_config_file(path)?;
    loaded.config.merge(layer);
    loaded.sources.push(path.to_path_buf());
    loaded.source = Some(path.to_path_buf());
    Ok(())
}

/// Load config from a specific file path (no discovery).
pub fn load_config_file(path: &Path) -> Result<FlowtrackConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    FlowtrackConfig::from_toml(&contents)
}

/// Save configuration to a file.
///
/// Creates parent directories if they don't exist.
pub fn save_config(config: &FlowtrackConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteFile {
            path: parent.display().to_string(),
            source: e,
        })?;
    }

    let contents = config.to_toml()?;
    std::fs::write(path, contents).map_err(|e| ConfigError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(())
}

/// Get the XDG config file path for flowtrack.
pub fn xdg_config_path() -> Option<PathBuf> {
    xdg_config_dir().map(|d| d.join(USER_CONFIG_FILE))
}

/// Get the XDG config directory for flowtrack.
pub fn xdg_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME))
}
