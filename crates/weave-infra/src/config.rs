//! Engine configuration loader.
//!
//! Reads `weave.toml` and deserializes it into [`EngineConfig`]. Falls back
//! to defaults when the file is missing or malformed, so a bad config never
//! prevents a run from starting.

use std::path::{Path, PathBuf};

use weave_types::config::EngineConfig;

/// File name looked up in the data directory when no path is given.
pub const CONFIG_FILE_NAME: &str = "weave.toml";

/// Load engine configuration from `path`.
///
/// - Missing file: returns [`EngineConfig::default()`].
/// - Unreadable or unparseable file: logs a warning and returns the default.
pub async fn load_engine_config(path: &Path) -> EngineConfig {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config found at {}, using defaults", path.display());
            return EngineConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", path.display());
            return EngineConfig::default();
        }
    };

    match toml::from_str::<EngineConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", path.display());
            EngineConfig::default()
        }
    }
}

/// `{data_dir}/weave.toml`.
pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CONFIG_FILE_NAME)
}
