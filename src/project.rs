//! Data project
//!
//! [`DataProject`] owns the virtual tree and everything needed to turn it into
//! graft points for an image writer: the URI table (one row per grafted or
//! excluded URI), the Joliet side table, the listeners and policy, and the
//! queue of I/O work for its collaborators.
//!
//! The project performs no I/O. It queues [`IoRequest`]s that a driver drains
//! with [`DataProject::take_requests`] and feeds results back through the
//! `on_*` handlers. Every handle carried by a request is generation checked,
//! so results for nodes removed in the meantime are dropped.

pub mod contents;
pub mod events;
mod graft;
mod loading;
mod ops;
pub mod span;

pub use contents::{
    default_project_path, load_project, save_project, ContentFlags, Contents, ExportOptions,
    GraftPoint, ProjectFile, PROJECT_FILE_VERSION,
};
pub use events::{
    AcceptAll, FetchError, FileInfo, FileKind, ImportedEntry, IoRequest, ListingEntry,
    MonitorEvent, ProjectListener, ProjectPolicy,
};
pub use span::SpanStatus;

use crate::config::{ProjectConfig, SortOrder};
use crate::joliet::JolietTable;
use crate::tree::{FileNode, FileTree, SortFn, TreeStats};
use crate::types::{NodeId, NEW_FOLDER};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::debug;

/// One row of the URI table.
///
/// A row with nodes lists every node grafted to the URI. A row with no node
/// is an exclusion: the URI must not appear at its natural location.
#[derive(Debug, Clone)]
pub struct UriNode {
    uri: Arc<str>,
    nodes: Vec<NodeId>,
}

impl UriNode {
    fn new(uri: Arc<str>) -> Self {
        Self {
            uri,
            nodes: Vec::new(),
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn is_exclusion(&self) -> bool {
        self.nodes.is_empty()
    }
}

pub struct DataProject {
    tree: FileTree,
    grafts: HashMap<Arc<str>, UriNode>,
    joliet: JolietTable,
    config: ProjectConfig,
    sort: Option<Box<SortFn>>,
    listeners: Vec<Box<dyn ProjectListener>>,
    policy: Box<dyn ProjectPolicy>,
    requests: VecDeque<IoRequest>,
    spanned: HashSet<NodeId>,
    last_span: Vec<NodeId>,
}

impl Default for DataProject {
    fn default() -> Self {
        Self::new(ProjectConfig::default())
    }
}

impl DataProject {
    pub fn new(config: ProjectConfig) -> Self {
        Self {
            tree: FileTree::new(),
            grafts: HashMap::new(),
            joliet: JolietTable::new(),
            sort: config.sort.comparator(),
            config,
            listeners: Vec::new(),
            policy: Box::new(AcceptAll),
            requests: VecDeque::new(),
            spanned: HashSet::new(),
            last_span: Vec::new(),
        }
    }

    pub fn with_policy(mut self, policy: impl ProjectPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    pub fn set_policy(&mut self, policy: Box<dyn ProjectPolicy>) {
        self.policy = policy;
    }

    pub fn add_listener(&mut self, listener: Box<dyn ProjectListener>) {
        self.listeners.push(listener);
    }

    pub fn tree(&self) -> &FileTree {
        &self.tree
    }

    pub fn root(&self) -> NodeId {
        self.tree.root()
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn stats(&self) -> TreeStats {
        self.tree.stats()
    }

    /// Resolve a handle, `None` once the node is gone.
    pub fn node(&self, id: NodeId) -> Option<&FileNode> {
        self.tree.get(id)
    }

    pub fn sort_order(&self) -> SortOrder {
        self.config.sort
    }

    /// Row of the URI table for `uri`.
    pub fn uri_node(&self, uri: &str) -> Option<&UriNode> {
        self.grafts.get(uri)
    }

    /// Every row of the URI table, ordered by URI.
    pub fn uri_nodes(&self) -> Vec<&UriNode> {
        let mut rows: Vec<&UriNode> = self.grafts.values().collect();
        rows.sort_by(|a, b| a.uri.cmp(&b.uri));
        rows
    }

    /// URIs currently excluded from their natural location.
    pub fn excluded_uris(&self) -> Vec<&str> {
        let mut uris: Vec<&str> = self
            .grafts
            .values()
            .filter(|row| row.is_exclusion())
            .map(|row| row.uri())
            .collect();
        uris.sort_unstable();
        uris
    }

    pub fn is_excluded(&self, uri: &str) -> bool {
        self.grafts.get(uri).is_some_and(|row| row.is_exclusion())
    }

    pub fn joliet(&self) -> &JolietTable {
        &self.joliet
    }

    /// Whether every name fits Joliet's length limit.
    pub fn is_joliet_compliant(&self) -> bool {
        self.joliet.is_empty()
    }

    /// Drain the queued collaborator work.
    pub fn take_requests(&mut self) -> Vec<IoRequest> {
        self.requests.drain(..).collect()
    }

    pub fn has_pending_requests(&self) -> bool {
        !self.requests.is_empty()
    }

    /// Whether some node still waits for metadata or a listing.
    pub fn is_loading(&self) -> bool {
        self.tree
            .descendants(self.tree.root())
            .into_iter()
            .any(|id| {
                let node = &self.tree[id];
                node.is_loading() || node.is_reloading() || node.is_exploring()
            })
    }

    /// Drop every node and table entry. Outstanding work is cancelled and
    /// watches are released.
    pub fn reset(&mut self) {
        let root = self.tree.root();
        for id in self.tree.descendants(root).into_iter().skip(1) {
            let node = &self.tree[id];
            if node.is_loading() || node.is_reloading() || node.is_exploring() {
                self.requests.push_back(IoRequest::Cancel { node: id });
            }
            if let Some(uri) = &node.monitored {
                self.requests.push_back(IoRequest::Unwatch {
                    uri: uri.to_string(),
                });
            }
        }
        let children: Vec<NodeId> = self.tree[root].children().to_vec();
        for child in children {
            let position = self.tree.visible_position(child);
            self.tree.unlink(child);
            if let Some(position) = position {
                self.emit(|l, t| l.node_removed(t, root, position, child));
            }
            self.tree.destroy(child);
        }
        let removed: Vec<Arc<str>> = self.grafts.drain().map(|(uri, _)| uri).collect();
        for uri in removed.iter().filter(|u| u.as_ref() != NEW_FOLDER) {
            self.emit_uri_removed(uri);
        }
        self.joliet.clear();
        self.spanned.clear();
        self.last_span.clear();
        debug!("project reset");
        self.emit_size_changed();
    }

    pub(crate) fn request(&mut self, request: IoRequest) {
        debug!(?request, "queue request");
        self.requests.push_back(request);
    }

    pub(crate) fn sort_fn(&self) -> Option<&SortFn> {
        self.sort.as_deref()
    }

    pub(crate) fn emit(&mut self, mut f: impl FnMut(&mut dyn ProjectListener, &FileTree)) {
        for listener in self.listeners.iter_mut() {
            f(listener.as_mut(), &self.tree);
        }
    }

    pub(crate) fn emit_added(&mut self, node: NodeId, uri: Option<&str>) {
        self.emit(|l, t| l.node_added(t, node, uri));
    }

    pub(crate) fn emit_changed(&mut self, node: NodeId) {
        self.emit(|l, t| l.node_changed(t, node));
    }

    pub(crate) fn emit_reordered(&mut self, parent: NodeId, order: &[usize]) {
        self.emit(|l, t| l.node_reordered(t, parent, order));
    }

    pub(crate) fn emit_uri_removed(&mut self, uri: &str) {
        for listener in self.listeners.iter_mut() {
            listener.uri_removed(uri);
        }
    }

    pub(crate) fn emit_unreadable(&mut self, uri: &str, reason: &str) {
        for listener in self.listeners.iter_mut() {
            listener.unreadable_uri(uri, reason);
        }
    }

    pub(crate) fn emit_size_changed(&mut self) {
        self.emit(|l, t| l.size_changed(t));
    }

    /// Track `node` in the Joliet table when its name is too long.
    pub(crate) fn joliet_add(&mut self, node: NodeId) {
        if !self.config.joliet {
            return;
        }
        let Some(parent) = self.tree[node].parent() else {
            return;
        };
        if self.tree[node].is_virtual() || self.tree[node].is_imported() {
            return;
        }
        let name = self.tree[node].name().to_string();
        if self.joliet.add(parent, &name, node) {
            debug!(node = %node, name = %name, "name exceeds Joliet limit");
        }
    }

    pub(crate) fn joliet_remove(&mut self, node: NodeId) {
        let Some(parent) = self.tree[node].parent() else {
            return;
        };
        let name = self.tree[node].name().to_string();
        self.joliet.remove(parent, &name, node);
    }
}
