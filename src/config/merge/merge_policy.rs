//! Base layer every merge starts from.

use crate::config::ProjectConfig;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat};

/// Builder seeded with the serialized defaults, so every later source only
/// has to name the keys it overrides.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let defaults = ProjectConfig::default()
        .to_toml_string()
        .map_err(|e| ConfigError::Message(e.to_string()))?;
    Ok(Config::builder().add_source(File::from_str(&defaults, FileFormat::Toml)))
}
