//! Error types for project operations.

use crate::types::NodeId;
use thiserror::Error;

/// Errors returned by tree and project operations.
///
/// Every variant names the URI, tree path or handle it concerns so the
/// presentation layer can report a localized message. Policy vetoes are not
/// errors; they surface as `Ok(None)` or status values.
#[derive(Error, Debug)]
pub enum ProjectError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Invalid URI {uri}: {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("Invalid name: {0:?}")]
    InvalidName(String),

    #[error("Invalid tree path: {0}")]
    InvalidPath(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Imported content cannot be modified: {0}")]
    ImportedNode(String),

    #[error("Cannot move {0} inside itself")]
    WouldCreateCycle(String),

    #[error("No remaining content fits in {0} sectors")]
    NothingToSpan(u64),

    #[error("Unsupported project file version {0}")]
    UnsupportedVersion(u32),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProjectError {
    pub(crate) fn invalid_uri(uri: &str, reason: impl std::fmt::Display) -> Self {
        ProjectError::InvalidUri {
            uri: uri.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<config::ConfigError> for ProjectError {
    fn from(err: config::ConfigError) -> Self {
        ProjectError::ConfigError(err.to_string())
    }
}
