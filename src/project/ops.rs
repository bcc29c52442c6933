//! Structural edits
//!
//! Every edit runs its veto checks (depth ceiling, name collision) before it
//! touches the tree, then updates the tree, the Joliet table and the URI
//! table, re-evaluates grafts and finally notifies listeners.

use super::events::{ImportedEntry, IoRequest};
use super::DataProject;
use crate::config::SortOrder;
use crate::error::ProjectError;
use crate::tree::{FileNode, NodeKind};
use crate::types::{NodeId, NEW_FOLDER};
use crate::uri;
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of a sibling name check.
enum Collision {
    Free,
    /// Virtual sentinel to absorb; its children move to the incoming node
    Absorb(NodeId),
    Replace(NodeId),
    /// Imported sibling to put aside until the name frees up again
    Shadow(NodeId),
    Abort,
}

pub(crate) fn validate_name(name: &str) -> Result<(), ProjectError> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\0')
    {
        return Err(ProjectError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// `order[new] == old` after one element moved from `old` to `new`.
pub(crate) fn single_move_order(len: usize, old: usize, new: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..len).collect();
    let moved = order.remove(old);
    order.insert(new, moved);
    order
}

impl DataProject {
    pub(crate) fn live(&self, node: NodeId) -> Result<(), ProjectError> {
        if self.tree.contains(node) {
            Ok(())
        } else {
            Err(ProjectError::NodeNotFound(node))
        }
    }

    fn require_directory(&self, parent: NodeId) -> Result<(), ProjectError> {
        self.live(parent)?;
        let node = &self.tree[parent];
        if !node.is_directory() || node.is_virtual() {
            return Err(ProjectError::NotADirectory(self.tree.path(parent)));
        }
        Ok(())
    }

    /// Attached, user-visible node that edits may target.
    fn editable_parent(&self, node: NodeId) -> Result<NodeId, ProjectError> {
        self.live(node)?;
        let n = &self.tree[node];
        if n.is_root() {
            return Err(ProjectError::InvalidPath("/".to_string()));
        }
        if n.is_imported() {
            return Err(ProjectError::ImportedNode(self.tree.path(node)));
        }
        if n.is_virtual() {
            return Err(ProjectError::NodeNotFound(node));
        }
        n.parent().ok_or(ProjectError::NodeNotFound(node))
    }

    /// Depth ceiling check for one new node under `parent`.
    pub(crate) fn depth_allowed(&mut self, parent: NodeId, kind: NodeKind, name: &str) -> bool {
        if !self.config.deep_directory_check || self.tree.stats().num_deep > 0 {
            return true;
        }
        let depth = self.tree.depth(parent) + 1;
        if !FileNode::exceeds_depth(kind, depth) {
            return true;
        }
        let accepted = self.policy.deep_directory(name);
        info!(name = %name, depth, accepted, "deep node");
        accepted
    }

    fn subtree_depth_allowed(&mut self, node: NodeId, new_parent: NodeId) -> bool {
        if !self.config.deep_directory_check || self.tree.stats().num_deep > 0 {
            return true;
        }
        let base = self.tree.depth(new_parent) + 1;
        let top = self.tree.depth(node);
        let exceeds = self.tree.descendants(node).into_iter().any(|d| {
            let n = &self.tree[d];
            !n.is_virtual() && FileNode::exceeds_depth(n.kind(), self.tree.depth(d) - top + base)
        });
        if !exceeds {
            return true;
        }
        let name = self.tree[node].name().to_string();
        self.policy.deep_directory(&name)
    }

    fn check_sibling(&mut self, parent: NodeId, name: &str, moving: Option<NodeId>) -> Collision {
        let Some(sibling) = self.tree.find_child(parent, name) else {
            return Collision::Free;
        };
        if Some(sibling) == moving {
            return Collision::Free;
        }
        if moving.is_some_and(|m| self.tree.is_ancestor(sibling, m)) {
            debug!(name = %name, "sibling is an ancestor of the moving node");
            return Collision::Abort;
        }
        if self.tree[sibling].is_virtual() {
            return Collision::Absorb(sibling);
        }
        if !self.policy.name_collision(&self.tree, sibling) {
            debug!(name = %name, "collision declined");
            return Collision::Abort;
        }
        if self.tree[sibling].is_imported() {
            Collision::Shadow(sibling)
        } else {
            Collision::Replace(sibling)
        }
    }

    /// Apply a collision decision. Returns the orphans the incoming node
    /// must adopt, or `None` when the operation is aborted.
    fn resolve_collision(&mut self, parent: NodeId, collision: Collision) -> Option<Vec<NodeId>> {
        match collision {
            Collision::Free => Some(Vec::new()),
            Collision::Abort => None,
            Collision::Replace(existing) => {
                info!(path = %self.tree.path(existing), "replace");
                self.remove_subtree(existing, true);
                Some(Vec::new())
            }
            Collision::Shadow(existing) => {
                let position = self.tree.visible_position(existing).unwrap_or_default();
                self.tree.save_imported(existing, parent);
                self.emit(|l, t| l.node_removed(t, parent, position, existing));
                Some(Vec::new())
            }
            Collision::Absorb(sentinel) => Some(self.take_virtual(sentinel)),
        }
    }

    /// Detach the children of a virtual sentinel and free it.
    pub(crate) fn take_virtual(&mut self, sentinel: NodeId) -> Vec<NodeId> {
        let children = self.tree[sentinel].children().to_vec();
        for child in &children {
            self.joliet_remove(*child);
            self.tree.unlink(*child);
        }
        self.tree.destroy(sentinel);
        children
    }

    /// Attach orphans taken from a virtual sentinel under `node`.
    pub(crate) fn adopt(&mut self, node: NodeId, orphans: Vec<NodeId>) {
        if orphans.is_empty() {
            return;
        }
        if !self.tree[node].is_directory() {
            for orphan in orphans {
                self.remove_subtree(orphan, false);
            }
            return;
        }
        for orphan in orphans {
            self.tree.insert(node, orphan, self.sort.as_deref());
            self.joliet_add(orphan);
            if let Some(graft_uri) = self.tree[orphan].graft_uri().map(str::to_string) {
                self.check_graft(&graft_uri);
            }
        }
    }

    /// Destroy `node` and its subtree with full bookkeeping: URI rows,
    /// Joliet entries, spanning marks, outstanding requests and watches.
    ///
    /// With `keep_exclusions` the removed content stays excluded from its
    /// natural location; otherwise rows left empty are dropped.
    pub(crate) fn remove_subtree(&mut self, node: NodeId, keep_exclusions: bool) {
        let natural_uri = if self.tree[node].is_grafted() {
            None
        } else {
            self.node_to_uri(node)
        };
        if let Some(parent) = self.tree[node].parent() {
            self.joliet_remove(node);
            let position = self.tree.visible_position(node);
            self.tree.unlink(node);
            if let Some(position) = position {
                self.emit(|l, t| l.node_removed(t, parent, position, node));
            }
        }
        let destroyed = self.tree.destroy(node);
        let mut touched: Vec<Arc<str>> = Vec::new();
        for record in &destroyed {
            if let Some(parent) = record.parent {
                self.joliet.remove(parent, record.node.name(), record.id);
            }
            if let Some(graft) = record.node.graft() {
                self.detach_from_row(record.id, &graft.uri);
                if !touched.contains(&graft.uri) {
                    touched.push(graft.uri.clone());
                }
            }
            self.spanned.remove(&record.id);
            self.last_span.retain(|n| *n != record.id);
            let n = &record.node;
            if n.is_loading() || n.is_reloading() || n.is_exploring() {
                self.requests
                    .push_back(IoRequest::Cancel { node: record.id });
            }
            if let Some(watched) = &n.monitored {
                self.requests.push_back(IoRequest::Unwatch {
                    uri: watched.to_string(),
                });
            }
        }
        debug!(node = %node, count = destroyed.len(), "destroyed");

        if keep_exclusions {
            if let Some(uri) = natural_uri {
                self.exclude_natural_slot(&uri);
            }
        }
        for uri in touched {
            self.settle_row(&uri, keep_exclusions);
        }
        self.emit_size_changed();
    }

    /// A natural slot for `uri` was emptied on purpose. Remaining natural
    /// instances get grafted so they survive the exclusion; without any,
    /// an exclusion row is left.
    pub(crate) fn exclude_natural_slot(&mut self, uri: &str) {
        if self.grafts.contains_key(uri) {
            return;
        }
        let others: Vec<NodeId> = self
            .uri_to_nodes(uri)
            .into_iter()
            .filter(|n| !self.tree[*n].is_grafted())
            .collect();
        match others.first() {
            Some(first) => {
                self.graft_node(*first, uri);
                self.check_graft(uri);
            }
            None if self.has_natural_parent(uri) => {
                let key: Arc<str> = Arc::from(uri);
                self.grafts.insert(key.clone(), super::UriNode::new(key));
            }
            None => {}
        }
    }

    pub(crate) fn restore_shadowed(&mut self, parent: NodeId, name: &str) {
        if !self.tree.contains(parent) || self.tree.find_child(parent, name).is_some() {
            return;
        }
        if let Some(restored) = self.tree.restore_imported(parent, name, self.sort.as_deref()) {
            debug!(node = %restored, "imported node restored");
            self.emit_added(restored, None);
        }
    }

    /// Insert a loading node for a URI at its natural place and ask for its
    /// metadata.
    pub(crate) fn add_natural_child(&mut self, parent: NodeId, name: &str, uri: &str) -> NodeId {
        let child = self.place_natural(parent, name, uri);
        self.request(IoRequest::Info {
            node: child,
            uri: uri.to_string(),
        });
        child
    }

    /// Create an empty folder. Returns `None` when a policy declined.
    pub fn add_empty_directory(
        &mut self,
        name: &str,
        parent: NodeId,
    ) -> Result<Option<NodeId>, ProjectError> {
        validate_name(name)?;
        self.require_directory(parent)?;
        if !self.depth_allowed(parent, NodeKind::Directory, name) {
            return Ok(None);
        }
        let collision = self.check_sibling(parent, name, None);
        let Some(orphans) = self.resolve_collision(parent, collision) else {
            return Ok(None);
        };

        let node = self.tree.alloc(FileNode::fake(name));
        self.tree.insert(parent, node, self.sort.as_deref());
        self.graft_node(node, NEW_FOLDER);
        self.joliet_add(node);
        self.adopt(node, orphans);
        info!(path = %self.tree.path(node), "empty directory added");
        self.emit_added(node, None);
        Ok(Some(node))
    }

    /// Add the content at `uri` under `parent`, named after the URI unless
    /// `name` is given. The node loads asynchronously; an `Info` request is
    /// queued for it.
    pub fn add_uri(
        &mut self,
        uri: &str,
        name: Option<&str>,
        parent: NodeId,
    ) -> Result<Option<NodeId>, ProjectError> {
        self.add_uri_node(uri, name, parent, false)
    }

    /// Like [`add_uri`](Self::add_uri) for a node kept out of the default
    /// export and listed after its visible siblings.
    pub fn add_hidden_uri(
        &mut self,
        uri: &str,
        name: Option<&str>,
        parent: NodeId,
    ) -> Result<Option<NodeId>, ProjectError> {
        self.add_uri_node(uri, name, parent, true)
    }

    fn add_uri_node(
        &mut self,
        uri: &str,
        name: Option<&str>,
        parent: NodeId,
        hidden: bool,
    ) -> Result<Option<NodeId>, ProjectError> {
        let uri = uri::canonicalize(uri)?;
        let name = match name {
            Some(name) => name.to_string(),
            None => uri::basename(&uri)
                .ok_or_else(|| ProjectError::invalid_uri(&uri, "URI has no name"))?,
        };
        validate_name(&name)?;
        self.require_directory(parent)?;
        let collision = self.check_sibling(parent, &name, None);
        let Some(orphans) = self.resolve_collision(parent, collision) else {
            return Ok(None);
        };

        let mut data = FileNode::loading(&name);
        if hidden {
            data = data.hidden();
        }
        let node = self.tree.alloc(data);
        if !orphans.is_empty() {
            self.tree.assume_kind(node, NodeKind::Directory);
        }
        self.tree.insert(parent, node, self.sort.as_deref());
        self.joliet_add(node);
        self.graft_node(node, &uri);
        self.check_graft(&uri);
        self.adopt(node, orphans);
        self.request(IoRequest::Info {
            node,
            uri: uri.clone(),
        });
        info!(uri = %uri, path = %self.tree.path(node), "uri added");
        self.emit_added(node, Some(&uri));
        Ok(Some(node))
    }

    /// Move `node` under `new_parent`. Returns `false` when a policy
    /// declined.
    pub fn move_node(&mut self, node: NodeId, new_parent: NodeId) -> Result<bool, ProjectError> {
        let old_parent = self.editable_parent(node)?;
        self.require_directory(new_parent)?;
        if self.tree.is_ancestor(node, new_parent) {
            return Err(ProjectError::WouldCreateCycle(self.tree.path(node)));
        }
        if old_parent == new_parent {
            return Ok(true);
        }
        let name = self.tree[node].name().to_string();
        if !self.subtree_depth_allowed(node, new_parent) {
            return Ok(false);
        }
        let collision = self.check_sibling(new_parent, &name, Some(node));
        let Some(orphans) = self.resolve_collision(new_parent, collision) else {
            return Ok(false);
        };

        let uri = self.node_to_uri(node);
        if let Some(uri) = &uri {
            if !self.tree[node].is_grafted() {
                self.graft_node(node, uri);
            }
        }
        self.joliet_remove(node);
        let position = self.tree.visible_position(node).unwrap_or_default();
        self.tree.move_from(node)?;
        self.emit(|l, t| l.node_removed(t, old_parent, position, node));
        self.tree.move_to(node, new_parent, self.sort.as_deref())?;
        self.joliet_add(node);
        self.adopt(node, orphans);
        if let Some(uri) = &uri {
            self.check_graft(uri);
        }
        self.restore_shadowed(old_parent, &name);
        info!(node = %node, path = %self.tree.path(node), "moved");
        self.emit_added(node, uri.as_deref());
        Ok(true)
    }

    /// Rename `node`. Returns `false` when a policy declined.
    pub fn rename_node(&mut self, node: NodeId, name: &str) -> Result<bool, ProjectError> {
        validate_name(name)?;
        let parent = self.editable_parent(node)?;
        let old_name = self.tree[node].name().to_string();
        if old_name == name {
            return Ok(true);
        }
        let collision = self.check_sibling(parent, name, Some(node));
        let Some(orphans) = self.resolve_collision(parent, collision) else {
            return Ok(false);
        };

        let uri = self.node_to_uri(node);
        if let Some(uri) = &uri {
            if !self.tree[node].is_grafted() {
                self.graft_node(node, uri);
            }
        }
        self.joliet_remove(node);
        self.tree.rename(node, name);
        self.joliet_add(node);
        self.adopt(node, orphans);
        if let Some(uri) = &uri {
            self.check_graft(uri);
        }
        if let Some((old, new)) = self.tree.reposition(node, self.sort.as_deref()) {
            let order = single_move_order(self.tree[parent].children().len(), old, new);
            self.emit_reordered(parent, &order);
        }
        self.restore_shadowed(parent, &old_name);
        info!(from = %old_name, to = %name, "renamed");
        self.emit_changed(node);
        Ok(true)
    }

    /// Remove `node` and its subtree. Natural content stays excluded; an
    /// imported node it was hiding comes back.
    pub fn remove_node(&mut self, node: NodeId) -> Result<(), ProjectError> {
        self.live(node)?;
        if self.tree[node].is_root() {
            return Err(ProjectError::InvalidPath("/".to_string()));
        }
        let parent = self.tree[node]
            .parent()
            .ok_or(ProjectError::NodeNotFound(node))?;
        let name = self.tree[node].name().to_string();
        info!(path = %self.tree.path(node), "remove");
        self.remove_subtree(node, true);
        self.restore_shadowed(parent, &name);
        Ok(())
    }

    /// Exclude `uri` from every place it would appear naturally. Nodes
    /// explicitly grafted to it stay.
    pub fn exclude_uri(&mut self, uri: &str) -> Result<(), ProjectError> {
        let uri = uri::canonicalize(uri)?;
        info!(uri = %uri, "exclude");
        self.ensure_exclusion(&uri);
        Ok(())
    }

    /// Undo an exclusion: the URI comes back at each natural place that is
    /// free. Returns the nodes created.
    pub fn restore_uri(&mut self, uri: &str) -> Result<Vec<NodeId>, ProjectError> {
        let uri = uri::canonicalize(uri)?;
        if !self.is_excluded(&uri) {
            return Ok(Vec::new());
        }
        let (Some(parent_uri), Some(name)) = (uri::parent(&uri), uri::basename(&uri)) else {
            return Ok(Vec::new());
        };
        let parents = self.uri_to_nodes(&parent_uri);
        let occupied = parents.iter().any(|p| {
            self.tree
                .find_child(*p, &name)
                .is_some_and(|c| self.node_to_uri(c).as_deref() != Some(uri.as_str()))
        });
        if occupied {
            debug!(uri = %uri, "natural place taken, exclusion kept");
            return Ok(Vec::new());
        }
        self.grafts.remove(uri.as_str());

        let mut restored = Vec::new();
        for parent in parents {
            let p = &self.tree[parent];
            if !p.is_directory() || p.is_loading() || p.is_exploring() || p.is_fake() {
                continue;
            }
            if self.tree.find_child(parent, &name).is_some() {
                continue;
            }
            restored.push(self.add_natural_child(parent, &name, &uri));
        }
        info!(uri = %uri, count = restored.len(), "restored");
        Ok(restored)
    }

    /// Install a sibling order and re-sort every directory.
    pub fn set_sort(&mut self, order: SortOrder) {
        self.config.sort = order;
        self.sort = order.comparator();
        let mut reordered = Vec::new();
        if let Some(cmp) = self.sort.as_deref() {
            let root = self.tree.root();
            for dir in self.tree.descendants(root) {
                if !self.tree[dir].is_directory() {
                    continue;
                }
                if let Some(permutation) = self.tree.sort_children(dir, cmp) {
                    reordered.push((dir, permutation));
                }
            }
        }
        for (dir, permutation) in reordered {
            self.emit_reordered(dir, &permutation);
        }
    }

    /// Reverse the visible children of `parent`.
    pub fn reverse_children(&mut self, parent: NodeId) -> Result<(), ProjectError> {
        self.require_directory(parent)?;
        if let Some(order) = self.tree.reverse_children(parent) {
            self.emit_reordered(parent, &order);
        }
        Ok(())
    }

    /// Insert previous-session content under the root or an imported
    /// directory. When a user node already holds the name, the imported node
    /// starts out shadowed.
    pub fn add_imported(
        &mut self,
        parent: NodeId,
        entry: ImportedEntry,
    ) -> Result<NodeId, ProjectError> {
        validate_name(&entry.name)?;
        self.require_directory(parent)?;
        let p = &self.tree[parent];
        if !p.is_root() && !p.is_imported() {
            return Err(ProjectError::InvalidPath(format!(
                "{} is not part of an imported session",
                self.tree.path(parent)
            )));
        }
        let existing = self.tree.find_child(parent, &entry.name);
        let node = self
            .tree
            .alloc(FileNode::imported(&entry.name, entry.kind, entry.sectors));
        self.tree.insert(parent, node, self.sort.as_deref());
        if existing.is_some_and(|e| !self.tree[e].is_virtual()) {
            self.tree.save_imported(node, parent);
            debug!(name = %entry.name, "imported node shadowed on arrival");
            return Ok(node);
        }
        self.emit_added(node, None);
        Ok(node)
    }

    /// Ask for the contents of an imported directory.
    pub fn explore_imported(&mut self, node: NodeId) -> Result<(), ProjectError> {
        self.live(node)?;
        let n = &self.tree[node];
        if !n.is_imported() {
            return Err(ProjectError::InvalidPath(format!(
                "{} is not imported",
                self.tree.path(node)
            )));
        }
        if !n.is_directory() {
            return Err(ProjectError::NotADirectory(self.tree.path(node)));
        }
        if !n.is_fake() || n.is_exploring() {
            return Ok(());
        }
        self.tree.set_exploring(node, true);
        let path = self.tree.path(node);
        self.request(IoRequest::ExploreImported { node, path });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::events::{FileInfo, ProjectPolicy};
    use crate::project::test_support::{recorded_project, settle, Event};
    use crate::project::{Contents, GraftPoint};
    use crate::tree::FileTree;

    struct Decline;

    impl ProjectPolicy for Decline {
        fn name_collision(&mut self, _tree: &FileTree, _existing: NodeId) -> bool {
            false
        }

        fn deep_directory(&mut self, _name: &str) -> bool {
            false
        }
    }

    fn loaded_tmp(project: &mut DataProject) -> NodeId {
        let root = project.root();
        let tmp = project.add_uri("file:///tmp", None, root).unwrap().unwrap();
        settle(
            project,
            &[("file:///tmp/a.txt", 2048), ("file:///tmp/b.txt", 4096)],
            &["file:///tmp"],
        );
        tmp
    }

    #[test]
    fn test_invalid_names_are_rejected() {
        let mut project = DataProject::default();
        let root = project.root();
        for name in ["", ".", "..", "a/b"] {
            assert!(matches!(
                project.add_empty_directory(name, root),
                Err(ProjectError::InvalidName(_))
            ));
        }
    }

    #[test]
    fn test_collision_declined_leaves_tree_untouched() {
        let mut project = DataProject::default().with_policy(Decline);
        let root = project.root();
        let first = project.add_empty_directory("A", root).unwrap().unwrap();
        assert_eq!(project.add_empty_directory("A", root).unwrap(), None);
        assert_eq!(project.tree()[root].children(), &[first]);
    }

    #[test]
    fn test_collision_replace_removes_existing() {
        let (mut project, log) = recorded_project();
        let root = project.root();
        let first = project.add_empty_directory("A", root).unwrap().unwrap();
        let second = project.add_empty_directory("A", root).unwrap().unwrap();
        assert!(!project.tree().contains(first));
        assert_eq!(project.tree()[root].children(), &[second]);
        assert!(log.lock().contains(&Event::Removed(root, 0, first)));
    }

    #[test]
    fn test_deep_directory_veto() {
        let mut project = DataProject::default().with_policy(Decline);
        let mut parent = project.root();
        for i in 0..4 {
            parent = project
                .add_empty_directory(&format!("d{}", i), parent)
                .unwrap()
                .unwrap();
        }
        assert_eq!(project.add_empty_directory("d4", parent).unwrap(), None);
        assert_eq!(project.stats().num_deep, 0);
        assert_eq!(project.stats().num_dir, 4);
    }

    #[test]
    fn test_remove_natural_file_leaves_exclusion() {
        let (mut project, log) = recorded_project();
        let tmp = loaded_tmp(&mut project);
        let a = project.tree().find_child(tmp, "a.txt").unwrap();
        assert_eq!(project.tree()[tmp].sectors(), 3);

        project.remove_node(a).unwrap();
        assert!(project.is_excluded("file:///tmp/a.txt"));
        assert_eq!(project.tree()[tmp].sectors(), 2);
        assert!(!log.lock().contains(&Event::UriRemoved("file:///tmp/a.txt".into())));

        let restored = project.restore_uri("file:///tmp/a.txt").unwrap();
        assert_eq!(restored.len(), 1);
        assert!(!project.is_excluded("file:///tmp/a.txt"));
        project.on_info_result(restored[0], "file:///tmp/a.txt", Ok(FileInfo::file(2048)));
        assert_eq!(project.tree()[tmp].sectors(), 3);
        project.tree().verify().unwrap();
    }

    #[test]
    fn test_remove_grafted_node_drops_its_row() {
        let (mut project, log) = recorded_project();
        let root = project.root();
        let a = project.add_empty_directory("A", root).unwrap().unwrap();
        let x = project
            .add_uri("file:///tmp/x.txt", None, a)
            .unwrap()
            .unwrap();
        project.remove_node(x).unwrap();
        assert!(project.uri_node("file:///tmp/x.txt").is_none());
        assert!(log
            .lock()
            .contains(&Event::UriRemoved("file:///tmp/x.txt".into())));
        assert!(project
            .take_requests()
            .contains(&IoRequest::Cancel { node: x }));
    }

    #[test]
    fn test_move_natural_node_grafts_it() {
        let mut project = DataProject::default();
        let root = project.root();
        let tmp = loaded_tmp(&mut project);
        let a = project.tree().find_child(tmp, "a.txt").unwrap();

        assert!(project.move_node(a, root).unwrap());
        assert_eq!(project.tree()[a].graft_uri(), Some("file:///tmp/a.txt"));
        assert_eq!(project.tree()[tmp].sectors(), 2);
        assert_eq!(project.sectors(), 3);

        assert!(project.move_node(a, tmp).unwrap());
        assert!(!project.tree()[a].is_grafted());
        assert_eq!(project.tree()[tmp].sectors(), 3);
        project.tree().verify().unwrap();
    }

    #[test]
    fn test_move_into_own_subtree_is_refused() {
        let mut project = DataProject::default();
        let root = project.root();
        let a = project.add_empty_directory("A", root).unwrap().unwrap();
        let b = project.add_empty_directory("B", a).unwrap().unwrap();
        assert!(matches!(
            project.move_node(a, b),
            Err(ProjectError::WouldCreateCycle(_))
        ));
    }

    #[test]
    fn test_move_onto_same_named_ancestor_is_aborted() {
        let mut project = DataProject::default();
        let root = project.root();
        let outer = project.add_empty_directory("a", root).unwrap().unwrap();
        let inner = project.add_empty_directory("a", outer).unwrap().unwrap();
        assert!(!project.move_node(inner, root).unwrap());
        assert!(project.tree().contains(outer));
        assert_eq!(project.tree()[inner].parent(), Some(outer));
        assert_eq!(project.tree().path(inner), "/a/a");
        project.tree().verify().unwrap();
    }

    #[test]
    fn test_removed_position_skips_sentinels() {
        let (mut project, log) = recorded_project();
        let grafts = [
            ("/tmp/", "file:///tmp"),
            ("/tmp/sub/x.txt", "file:///elsewhere/x.txt"),
            ("/tmp/z.txt", "file:///elsewhere/z.txt"),
        ];
        let contents = Contents {
            grafts: grafts
                .iter()
                .map(|(path, uri)| GraftPoint {
                    path: path.to_string(),
                    uri: Some(uri.to_string()),
                })
                .collect(),
            ..Contents::default()
        };
        project.load_contents(&contents).unwrap();
        let tmp = project.tree().find_path("/tmp").unwrap();
        let sub = project.tree().find_path("/tmp/sub").unwrap();
        let z = project.tree().find_path("/tmp/z.txt").unwrap();
        assert!(project.tree()[sub].is_virtual());
        assert_eq!(project.tree()[tmp].children(), &[sub, z]);

        project.remove_node(z).unwrap();
        assert!(log.lock().contains(&Event::Removed(tmp, 0, z)));
    }

    #[test]
    fn test_imported_node_is_shadowed_and_restored() {
        let (mut project, log) = recorded_project();
        let root = project.root();
        let old = project
            .add_imported(
                root,
                ImportedEntry {
                    name: "notes".to_string(),
                    kind: NodeKind::Directory,
                    sectors: 0,
                },
            )
            .unwrap();
        assert!(matches!(
            project.rename_node(old, "x"),
            Err(ProjectError::ImportedNode(_))
        ));

        let folder = project.add_empty_directory("notes", root).unwrap().unwrap();
        assert_eq!(project.tree()[root].children(), &[folder]);
        assert!(project.tree().contains(old));
        assert!(log.lock().contains(&Event::Removed(root, 0, old)));

        assert!(project.rename_node(folder, "other").unwrap());
        assert_eq!(project.tree()[old].parent(), Some(root));
        assert_eq!(project.tree().n_children(root), 2);
        project.tree().verify().unwrap();
    }

    #[test]
    fn test_sort_emits_permutations() {
        let (mut project, log) = recorded_project();
        let root = project.root();
        for name in ["c", "a", "b"] {
            project.add_empty_directory(name, root).unwrap();
        }
        project.set_sort(SortOrder::Name);
        assert!(log.lock().contains(&Event::Reordered(root, vec![1, 2, 0])));
        let names: Vec<&str> = project
            .tree()
            .visible_children(root)
            .map(|c| project.tree()[c].name())
            .collect();
        assert_eq!(names, ["a", "b", "c"]);

        project.reverse_children(root).unwrap();
        assert_eq!(project.tree().path(project.tree()[root].children()[0]), "/c");
    }

    #[test]
    fn test_single_move_order() {
        assert_eq!(single_move_order(4, 0, 2), vec![1, 2, 0, 3]);
        assert_eq!(single_move_order(3, 2, 0), vec![2, 0, 1]);
    }
}
