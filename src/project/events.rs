//! Collaborator protocol: notifications, policy decisions, I/O requests
//! and the results that come back for them.

use crate::tree::{FileTree, NodeKind};
use crate::types::NodeId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Change notifications for a presentation layer.
///
/// Calls are synchronous and made while the tree is consistent. Listeners
/// get a read-only view; follow-up edits are issued by whoever owns the
/// project once the current call returns, which keeps re-entrant sequences
/// well defined.
pub trait ProjectListener {
    fn node_added(&mut self, _tree: &FileTree, _node: NodeId, _uri: Option<&str>) {}

    /// `node` is detached but still readable when this fires.
    fn node_removed(
        &mut self,
        _tree: &FileTree,
        _former_parent: NodeId,
        _former_position: usize,
        _node: NodeId,
    ) {
    }

    fn node_changed(&mut self, _tree: &FileTree, _node: NodeId) {}

    /// `order[new_index] == old_index` for the children of `parent`.
    fn node_reordered(&mut self, _tree: &FileTree, _parent: NodeId, _order: &[usize]) {}

    fn uri_removed(&mut self, _uri: &str) {}

    fn unreadable_uri(&mut self, _uri: &str, _reason: &str) {}

    fn size_changed(&mut self, _tree: &FileTree) {}
}

/// Yes/no decisions the project delegates. `true` lets the operation go on.
pub trait ProjectPolicy {
    /// A real sibling already uses the name: `true` replaces it, `false`
    /// aborts the operation.
    fn name_collision(&mut self, _tree: &FileTree, _existing: NodeId) -> bool {
        true
    }

    /// First node past the ISO9660 depth ceiling: `true` accepts it.
    fn deep_directory(&mut self, _name: &str) -> bool {
        true
    }

    /// File over the 2 GiB ceiling: `true` keeps it, `false` removes and
    /// excludes it.
    fn oversize_file(&mut self, _name: &str) -> bool {
        true
    }
}

/// Policy that accepts everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl ProjectPolicy for AcceptAll {}

/// Work the project wants done by its collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IoRequest {
    /// Fetch type, size and symlink target
    Info { node: NodeId, uri: String },
    /// Enumerate a directory
    Listing { node: NodeId, uri: String },
    Watch { node: NodeId, uri: String },
    Unwatch { uri: String },
    /// The node went away; drop any outstanding work for it
    Cancel { node: NodeId },
    /// List an imported directory from the previous session
    ExploreImported { node: NodeId, path: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileKind {
    Regular,
    Directory,
}

impl From<FileKind> for NodeKind {
    fn from(kind: FileKind) -> Self {
        match kind {
            FileKind::Regular => NodeKind::File,
            FileKind::Directory => NodeKind::Directory,
        }
    }
}

/// Metadata for one URI. For a symlink, `kind` and `size` describe the
/// target when it could be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub kind: FileKind,
    pub size: u64,
    pub symlink_target: Option<String>,
}

impl FileInfo {
    pub fn file(size: u64) -> Self {
        Self {
            kind: FileKind::Regular,
            size,
            symlink_target: None,
        }
    }

    pub fn directory() -> Self {
        Self {
            kind: FileKind::Directory,
            size: 0,
            symlink_target: None,
        }
    }

    pub fn symlink(target: &str, kind: FileKind, size: u64) -> Self {
        Self {
            kind,
            size,
            symlink_target: Some(target.to_string()),
        }
    }
}

/// One child returned by a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingEntry {
    pub name: String,
    pub info: FileInfo,
}

/// Entry of a previously written session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedEntry {
    pub name: String,
    pub kind: NodeKind,
    pub sectors: u64,
}

/// Failure reported by a fetch collaborator for one URI.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("file not found")]
    NotFound,
    #[error("permission denied")]
    PermissionDenied,
    #[error("unsupported location")]
    Unsupported,
    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for FetchError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => FetchError::NotFound,
            std::io::ErrorKind::PermissionDenied => FetchError::PermissionDenied,
            _ => FetchError::Other(err.to_string()),
        }
    }
}

/// Live filesystem change, keyed by URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    Created { uri: String },
    Deleted { uri: String },
    Changed { uri: String },
    /// Renamed inside the same directory
    Renamed { from: String, to: String },
    Moved { from: String, to: String },
}
