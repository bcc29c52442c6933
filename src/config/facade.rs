//! ConfigLoader facade delegating to merge service.

use super::merge::service::MergeService;
use super::ProjectConfig;
use config::ConfigError;
use std::path::Path;

/// Configuration loader facade.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from the global file and environment.
    pub fn load() -> Result<ProjectConfig, ConfigError> {
        MergeService::load(None)
    }

    /// Load configuration with an explicit project file layered over the
    /// global one.
    pub fn load_with(path: &Path) -> Result<ProjectConfig, ConfigError> {
        MergeService::load(Some(path))
    }

    /// Load configuration from a specific file only.
    pub fn load_from_file(path: &Path) -> Result<ProjectConfig, ConfigError> {
        MergeService::load_from_file(path)
    }

    /// Create default configuration.
    pub fn default() -> ProjectConfig {
        ProjectConfig::default()
    }
}
