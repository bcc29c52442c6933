//! Project tree node types

use crate::types::{NodeId, DEEP_DIRECTORY_DEPTH, DEEP_FILE_DEPTH};
use std::sync::Arc;

/// Graft record: the node's name plus the URI-table key it is grafted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Graft {
    pub name: String,
    pub uri: Arc<str>,
}

/// Name storage: either a plain name or a graft record holding it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeName {
    Plain(String),
    Grafted(Graft),
}

/// Content kind of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
}

/// Metadata state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Ready,
    /// Metadata not fetched yet
    Loading,
    /// Re-validating after an external change
    Reloading,
}

/// Imported node detached from its parent because a new node took its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowedImport {
    pub node: NodeId,
    pub position: usize,
}

/// One entry of the virtual project tree.
#[derive(Debug, Clone)]
pub struct FileNode {
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) replaced: Vec<ShadowedImport>,
    pub(crate) name: NodeName,
    pub(crate) kind: NodeKind,
    /// Files: own size. Directories: sum over children that are neither
    /// grafted nor virtual.
    pub(crate) sectors: u64,
    pub(crate) state: LoadState,
    pub(crate) symlink_target: Option<String>,
    pub(crate) is_root: bool,
    pub(crate) is_fake: bool,
    pub(crate) is_virtual: bool,
    pub(crate) is_imported: bool,
    pub(crate) is_symlink: bool,
    pub(crate) is_hidden: bool,
    pub(crate) is_2gib: bool,
    pub(crate) is_deep: bool,
    pub(crate) is_exploring: bool,
    pub(crate) monitored: Option<Arc<str>>,
}

impl FileNode {
    fn with_kind(name: &str, kind: NodeKind) -> Self {
        Self {
            parent: None,
            children: Vec::new(),
            replaced: Vec::new(),
            name: NodeName::Plain(name.to_string()),
            kind,
            sectors: 0,
            state: LoadState::Ready,
            symlink_target: None,
            is_root: false,
            is_fake: false,
            is_virtual: false,
            is_imported: false,
            is_symlink: false,
            is_hidden: false,
            is_2gib: false,
            is_deep: false,
            is_exploring: false,
            monitored: None,
        }
    }

    pub(crate) fn root() -> Self {
        let mut node = Self::with_kind("", NodeKind::Directory);
        node.is_root = true;
        node
    }

    /// Regular file of known size
    pub fn file(name: &str, sectors: u64) -> Self {
        let mut node = Self::with_kind(name, NodeKind::File);
        node.sectors = sectors;
        node
    }

    /// Real directory
    pub fn directory(name: &str) -> Self {
        Self::with_kind(name, NodeKind::Directory)
    }

    /// Directory placeholder with no backing content
    pub fn fake(name: &str) -> Self {
        let mut node = Self::with_kind(name, NodeKind::Directory);
        node.is_fake = true;
        node
    }

    /// Collision sentinel: a directory expected to appear from enumeration
    pub fn virtual_directory(name: &str) -> Self {
        let mut node = Self::with_kind(name, NodeKind::Directory);
        node.is_virtual = true;
        node
    }

    /// Node whose metadata has not been fetched; assumed to be a file.
    pub fn loading(name: &str) -> Self {
        let mut node = Self::with_kind(name, NodeKind::File);
        node.state = LoadState::Loading;
        node
    }

    /// Content from a previously written session. Directories start fake
    /// until they are explored.
    pub fn imported(name: &str, kind: NodeKind, sectors: u64) -> Self {
        let mut node = Self::with_kind(name, kind);
        node.is_imported = true;
        match kind {
            NodeKind::File => node.sectors = sectors,
            NodeKind::Directory => node.is_fake = true,
        }
        node
    }

    pub fn hidden(mut self) -> Self {
        self.is_hidden = true;
        self
    }

    pub fn name(&self) -> &str {
        match &self.name {
            NodeName::Plain(name) => name,
            NodeName::Grafted(graft) => &graft.name,
        }
    }

    pub fn graft(&self) -> Option<&Graft> {
        match &self.name {
            NodeName::Grafted(graft) => Some(graft),
            NodeName::Plain(_) => None,
        }
    }

    pub fn graft_uri(&self) -> Option<&str> {
        self.graft().map(|g| g.uri.as_ref())
    }

    pub fn is_grafted(&self) -> bool {
        matches!(self.name, NodeName::Grafted(_))
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }

    pub fn is_directory(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    pub fn sectors(&self) -> u64 {
        self.sectors
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn is_loading(&self) -> bool {
        self.state == LoadState::Loading
    }

    pub fn is_reloading(&self) -> bool {
        self.state == LoadState::Reloading
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }

    pub fn is_fake(&self) -> bool {
        self.is_fake
    }

    pub fn is_virtual(&self) -> bool {
        self.is_virtual
    }

    pub fn is_imported(&self) -> bool {
        self.is_imported
    }

    pub fn is_symlink(&self) -> bool {
        self.is_symlink
    }

    pub fn symlink_target(&self) -> Option<&str> {
        self.symlink_target.as_deref()
    }

    pub fn is_hidden(&self) -> bool {
        self.is_hidden
    }

    pub fn is_2gib(&self) -> bool {
        self.is_2gib
    }

    pub fn is_deep(&self) -> bool {
        self.is_deep
    }

    pub fn is_exploring(&self) -> bool {
        self.is_exploring
    }

    pub fn shadowed_imports(&self) -> &[ShadowedImport] {
        &self.replaced
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        match &mut self.name {
            NodeName::Plain(current) => *current = name.to_string(),
            NodeName::Grafted(graft) => graft.name = name.to_string(),
        }
    }

    /// Whether a node of this kind at `depth` is past the ISO9660 ceiling.
    pub(crate) fn exceeds_depth(kind: NodeKind, depth: usize) -> bool {
        match kind {
            NodeKind::Directory => depth >= DEEP_DIRECTORY_DEPTH,
            NodeKind::File => depth >= DEEP_FILE_DEPTH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_lives_in_exactly_one_place() {
        let mut node = FileNode::file("a.txt", 3);
        assert_eq!(node.name(), "a.txt");
        assert!(!node.is_grafted());

        node.name = NodeName::Grafted(Graft {
            name: "a.txt".to_string(),
            uri: Arc::from("file:///tmp/a.txt"),
        });
        node.set_name("b.txt");
        assert_eq!(node.name(), "b.txt");
        assert_eq!(node.graft_uri(), Some("file:///tmp/a.txt"));
    }

    #[test]
    fn test_imported_directory_starts_fake() {
        let dir = FileNode::imported("old", NodeKind::Directory, 99);
        assert!(dir.is_fake());
        assert!(dir.is_imported());
        assert_eq!(dir.sectors(), 0);

        let file = FileNode::imported("old.txt", NodeKind::File, 4);
        assert!(!file.is_fake());
        assert_eq!(file.sectors(), 4);
    }

    #[test]
    fn test_depth_ceiling() {
        assert!(!FileNode::exceeds_depth(NodeKind::Directory, 4));
        assert!(FileNode::exceeds_depth(NodeKind::Directory, 5));
        assert!(!FileNode::exceeds_depth(NodeKind::File, 5));
        assert!(FileNode::exceeds_depth(NodeKind::File, 6));
    }
}
