//! XDG Base Directory utilities for discgraft files.

use crate::error::ProjectError;
use std::path::PathBuf;

/// Get XDG config home directory
///
/// Returns `$XDG_CONFIG_HOME` if set, otherwise defaults to `$HOME/.config`
/// Follows XDG Base Directory Specification
pub fn config_home() -> Result<PathBuf, ProjectError> {
    if let Ok(xdg_config_home) = std::env::var("XDG_CONFIG_HOME") {
        return Ok(PathBuf::from(xdg_config_home));
    }

    let home = std::env::var("HOME").map_err(|_| {
        ProjectError::ConfigError(
            "Could not determine XDG config home directory (HOME not set)".to_string(),
        )
    })?;

    Ok(PathBuf::from(home).join(".config"))
}

/// Get XDG data home directory
///
/// Returns `$XDG_DATA_HOME` if set, otherwise defaults to `$HOME/.local/share`
pub fn data_home() -> Option<PathBuf> {
    if let Ok(xdg_data_home) = std::env::var("XDG_DATA_HOME") {
        return Some(PathBuf::from(xdg_data_home));
    }

    std::env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".local").join("share"))
}

/// `$XDG_CONFIG_HOME/discgraft/config.toml`
pub fn global_config_path() -> Result<PathBuf, ProjectError> {
    Ok(config_home()?.join("discgraft").join("config.toml"))
}

/// Directory for saved projects
///
/// Returns `$XDG_DATA_HOME/discgraft/projects/`, creating it if needed.
pub fn projects_dir() -> Result<PathBuf, ProjectError> {
    let data_home = data_home().ok_or_else(|| {
        ProjectError::ConfigError(
            "Could not determine XDG data home directory (HOME not set)".to_string(),
        )
    })?;
    let dir = data_home.join("discgraft").join("projects");

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| {
            ProjectError::ConfigError(format!(
                "Failed to create projects directory {}: {}",
                dir.display(),
                e
            ))
        })?;
    }

    Ok(dir)
}
