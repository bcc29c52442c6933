//! Project configuration
//!
//! Layered with the `config` crate: built-in defaults, the global file under
//! `$XDG_CONFIG_HOME/discgraft/config.toml`, an optional explicit file, then
//! `DISCGRAFT__*` environment variables.

pub mod facade;
pub mod merge {
    pub mod merge_policy;
    pub mod service;
}
pub mod paths {
    pub mod xdg_root;
}
pub mod sources {
    pub mod environment;
    pub mod global_file;
}

pub use facade::ConfigLoader;

use crate::error::ProjectError;
use crate::logging::LoggingConfig;
use crate::tree::{FileNode, NodeKind, SortFn};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Sibling order used by the project tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortOrder {
    /// Insertion order
    #[default]
    None,
    Name,
    NameDescending,
    Size,
}

fn directories_first(a: &FileNode, b: &FileNode) -> Ordering {
    match (a.kind(), b.kind()) {
        (NodeKind::Directory, NodeKind::File) => Ordering::Less,
        (NodeKind::File, NodeKind::Directory) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

impl SortOrder {
    /// Comparator for this order; directories always come first.
    pub fn comparator(self) -> Option<Box<SortFn>> {
        match self {
            SortOrder::None => None,
            SortOrder::Name => Some(Box::new(|a: &FileNode, b: &FileNode| {
                directories_first(a, b).then_with(|| a.name().cmp(b.name()))
            })),
            SortOrder::NameDescending => Some(Box::new(|a: &FileNode, b: &FileNode| {
                directories_first(a, b).then_with(|| b.name().cmp(a.name()))
            })),
            SortOrder::Size => Some(Box::new(|a: &FileNode, b: &FileNode| {
                directories_first(a, b)
                    .then_with(|| a.sectors().cmp(&b.sectors()))
                    .then_with(|| a.name().cmp(b.name()))
            })),
        }
    }
}

/// Settings for a data project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Replace symlinks by their targets
    #[serde(default)]
    pub follow_symlinks: bool,

    /// Track Joliet name length limits and force grafts for long names
    #[serde(default = "default_true")]
    pub joliet: bool,

    /// Directory graft paths end with `/`
    #[serde(default = "default_true")]
    pub append_slash: bool,

    #[serde(default)]
    pub sort: SortOrder,

    /// Ask before accepting content past the ISO9660 depth ceiling
    #[serde(default = "default_true")]
    pub deep_directory_check: bool,

    /// Sectors reserved at the end of each spanned image
    #[serde(default = "default_span_end_pad")]
    pub span_end_pad: u64,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_true() -> bool {
    true
}

fn default_span_end_pad() -> u64 {
    150
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            follow_symlinks: false,
            joliet: default_true(),
            append_slash: default_true(),
            sort: SortOrder::default(),
            deep_directory_check: default_true(),
            span_end_pad: default_span_end_pad(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ProjectConfig {
    /// Serialize as TOML, the format read back by [`ConfigLoader`].
    pub fn to_toml_string(&self) -> Result<String, ProjectError> {
        toml::to_string_pretty(self).map_err(|e| ProjectError::ConfigError(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ProjectError> {
        match self.logging.format.as_str() {
            "json" | "text" => Ok(()),
            other => Err(ProjectError::ConfigError(format!(
                "Invalid log format: {} (must be 'json' or 'text')",
                other
            ))),
        }
    }
}
