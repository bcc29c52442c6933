//! Discgraft: virtual file trees for optical disc data projects
//!
//! A project tree is assembled from files and folders taken anywhere (local
//! paths, remote URIs, previous disc sessions) and laid out freely. The crate
//! keeps that tree consistent with the sources and turns it into the graft
//! points and exclusions an ISO9660/Joliet image writer needs to reproduce it.

pub mod config;
pub mod error;
pub mod io;
pub mod joliet;
pub mod logging;
pub mod project;
pub mod tree;
pub mod types;
pub mod uri;

pub use config::{ConfigLoader, ProjectConfig, SortOrder};
pub use error::ProjectError;
pub use project::{Contents, DataProject, ExportOptions, GraftPoint};
pub use tree::{FileNode, FileTree, NodeKind, TreeStats};
pub use types::NodeId;
