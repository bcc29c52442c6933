//! Project file tree
//!
//! Arena-backed n-ary tree of [`FileNode`]s. Parents are stored as plain
//! handles; ownership of every node belongs to the arena. The tree keeps its
//! [`TreeStats`] and every directory's sector count current on each
//! structural change, so none of them ever needs a second traversal.

pub(crate) mod arena;
pub mod node;
pub mod stats;

pub use node::{FileNode, Graft, LoadState, NodeKind, NodeName, ShadowedImport};
pub use stats::TreeStats;

use crate::error::ProjectError;
use crate::types::{NodeId, TWO_GIB_SECTORS};
use arena::Arena;
use std::cmp::Ordering;
use std::ops::Index;
use std::sync::Arc;

/// Sibling comparator
pub type SortFn = dyn Fn(&FileNode, &FileNode) -> Ordering;

/// A node removed from the arena by [`FileTree::destroy`].
#[derive(Debug, Clone)]
pub struct DestroyedNode {
    pub id: NodeId,
    /// Parent at the time of destruction (former parent for the top node)
    pub parent: Option<NodeId>,
    pub node: FileNode,
}

/// Freshly fetched metadata applied by [`FileTree::set_from_info`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoUpdate {
    pub kind: NodeKind,
    pub sectors: u64,
    pub is_symlink: bool,
    pub symlink_target: Option<String>,
}

fn apply_delta(value: &mut u64, delta: i64) {
    if delta >= 0 {
        *value += delta as u64;
    } else {
        let amount = delta.unsigned_abs();
        let current = *value;
        *value = current
            .checked_sub(amount)
            .unwrap_or_else(|| panic!("sector count underflow: {} - {}", current, amount));
    }
}

pub struct FileTree {
    arena: Arena<FileNode>,
    root: NodeId,
    stats: TreeStats,
}

impl Default for FileTree {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<NodeId> for FileTree {
    type Output = FileNode;

    fn index(&self, id: NodeId) -> &FileNode {
        self.arena
            .get(id)
            .unwrap_or_else(|| panic!("stale node handle {}", id))
    }
}

impl FileTree {
    pub fn new() -> Self {
        let mut arena = Arena::new();
        let root = arena.insert(FileNode::root());
        Self {
            arena,
            root,
            stats: TreeStats::default(),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn stats(&self) -> TreeStats {
        self.stats
    }

    /// Number of live nodes, root included
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self[self.root].children.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<&FileNode> {
        self.arena.get(id)
    }

    /// Whether `id` still refers to a live node.
    pub fn contains(&self, id: NodeId) -> bool {
        self.arena.get(id).is_some()
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut FileNode {
        self.arena
            .get_mut(id)
            .unwrap_or_else(|| panic!("stale node handle {}", id))
    }

    /// Allocate a detached node.
    pub fn alloc(&mut self, node: FileNode) -> NodeId {
        self.arena.insert(node)
    }

    /// Distance from the root; root children are at depth 1.
    pub fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut current = id;
        while let Some(parent) = self[current].parent {
            depth += 1;
            current = parent;
        }
        depth
    }

    /// Absolute path of a node inside the tree, `/` for the root.
    pub fn path(&self, id: NodeId) -> String {
        let mut names = Vec::new();
        let mut current = id;
        while let Some(parent) = self[current].parent {
            names.push(self[current].name());
            current = parent;
        }
        if names.is_empty() {
            return "/".to_string();
        }
        names.reverse();
        format!("/{}", names.join("/"))
    }

    /// Child of `parent` called `name`, virtual children included.
    pub fn find_child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self[parent]
            .children
            .iter()
            .copied()
            .find(|child| self[*child].name() == name)
    }

    /// Look a node up by its absolute tree path.
    pub fn find_path(&self, path: &str) -> Option<NodeId> {
        let mut current = self.root;
        for component in path.split('/').filter(|c| !c.is_empty()) {
            current = self.find_child(current, component)?;
        }
        Some(current)
    }

    /// Children excluding virtual sentinels
    pub fn visible_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self[id]
            .children
            .iter()
            .copied()
            .filter(move |child| !self[*child].is_virtual)
    }

    pub fn n_children(&self, id: NodeId) -> usize {
        self.visible_children(id).count()
    }

    /// Position of `id` among its visible siblings.
    pub fn visible_position(&self, id: NodeId) -> Option<usize> {
        let parent = self[id].parent?;
        self.visible_children(parent).position(|child| child == id)
    }

    /// `id` and all its descendants, parents before children.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self[current].children.iter().rev().copied());
        }
        out
    }

    /// Whether `ancestor` is `node` or one of its ancestors.
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self[id].parent;
        }
        false
    }

    fn has_deep_ancestor(&self, id: NodeId) -> bool {
        let mut current = self[id].parent;
        while let Some(parent) = current {
            if self[parent].is_deep {
                return true;
            }
            current = self[parent].parent;
        }
        false
    }

    /// Sectors the node would occupy on disc: its own count plus every
    /// grafted descendant, which its own count leaves out.
    pub fn total_sectors(&self, id: NodeId) -> u64 {
        let own = if id == self.root || !self[id].is_virtual {
            self[id].sectors
        } else {
            0
        };
        own + self
            .descendants(id)
            .into_iter()
            .skip(1)
            .filter(|d| self[*d].is_grafted())
            .map(|d| self[d].sectors)
            .sum::<u64>()
    }

    /// Add `delta` to every ancestor of `from` up to the nearest grafted
    /// (or virtual) ancestor or the root.
    fn propagate(&mut self, from: NodeId, delta: i64) {
        if delta == 0 {
            return;
        }
        let mut current = from;
        loop {
            let node = &self[current];
            if node.is_root || node.is_grafted() || node.is_virtual {
                break;
            }
            let Some(parent) = node.parent else { break };
            apply_delta(&mut self.node_mut(parent).sectors, delta);
            current = parent;
        }
    }

    fn attach_stats(&mut self, id: NodeId) {
        let depth = self.depth(id);
        let ancestor_deep = self.has_deep_ancestor(id);
        self.attach_stats_rec(id, depth, ancestor_deep);
    }

    fn attach_stats_rec(&mut self, id: NodeId, depth: usize, ancestor_deep: bool) {
        let node = self
            .arena
            .get_mut(id)
            .unwrap_or_else(|| panic!("stale node handle {}", id));
        let mut deep_below = ancestor_deep;
        if node.is_virtual {
            node.is_deep = false;
        } else {
            node.is_deep = !ancestor_deep && FileNode::exceeds_depth(node.kind, depth);
            deep_below |= node.is_deep;
            self.stats.add(node);
        }
        let children = node.children.clone();
        for child in children {
            self.attach_stats_rec(child, depth + 1, deep_below);
        }
    }

    fn detach_stats(&mut self, id: NodeId) {
        for node_id in self.descendants(id) {
            let node = self
                .arena
                .get_mut(node_id)
                .unwrap_or_else(|| panic!("stale node handle {}", node_id));
            self.stats.remove(node);
            node.is_deep = false;
        }
    }

    fn attach_node_stats(&mut self, id: NodeId) {
        let depth = self.depth(id);
        let ancestor_deep = self.has_deep_ancestor(id);
        let node = self
            .arena
            .get_mut(id)
            .unwrap_or_else(|| panic!("stale node handle {}", id));
        if !node.is_virtual {
            node.is_deep = !ancestor_deep && FileNode::exceeds_depth(node.kind, depth);
        }
        self.stats.add(node);
    }

    fn detach_node_stats(&mut self, id: NodeId) {
        let node = self
            .arena
            .get_mut(id)
            .unwrap_or_else(|| panic!("stale node handle {}", id));
        self.stats.remove(node);
        node.is_deep = false;
    }

    fn insert_position(&self, parent: NodeId, id: NodeId, cmp: Option<&SortFn>) -> usize {
        let node = &self[id];
        let siblings = &self[parent].children;
        let hidden_start = siblings
            .iter()
            .position(|c| self[*c].is_hidden)
            .unwrap_or(siblings.len());
        if node.is_hidden {
            return siblings.len();
        }
        match cmp {
            Some(cmp) => siblings[..hidden_start]
                .iter()
                .position(|c| cmp(node, &self[*c]) == Ordering::Less)
                .unwrap_or(hidden_start),
            None => hidden_start,
        }
    }

    fn link_at(&mut self, parent: NodeId, id: NodeId, position: usize) {
        assert!(
            self[id].parent.is_none(),
            "node {} is already attached",
            id
        );
        assert!(
            self[parent].is_directory(),
            "cannot insert under non-directory {}",
            self.path(parent)
        );
        self.node_mut(parent).children.insert(position, id);
        self.node_mut(id).parent = Some(parent);
        self.attach_stats(id);
        let sectors = self[id].sectors as i64;
        self.propagate(id, sectors);
    }

    /// Insert a detached node among `parent`'s children in sorted order.
    ///
    /// Hidden nodes always stay after visible ones. Returns the index the
    /// node now occupies in the sibling list.
    pub fn insert(&mut self, parent: NodeId, id: NodeId, cmp: Option<&SortFn>) -> usize {
        let position = self.insert_position(parent, id, cmp);
        self.link_at(parent, id, position);
        position
    }

    /// Detach a node (and its subtree) from its parent without freeing it.
    ///
    /// Returns the former sibling index. Panics when the node has no parent.
    pub fn unlink(&mut self, id: NodeId) -> usize {
        let parent = self[id]
            .parent
            .unwrap_or_else(|| panic!("unlinking {} which has no parent", id));
        let sectors = self[id].sectors as i64;
        self.propagate(id, -sectors);
        self.detach_stats(id);
        let siblings = &mut self.node_mut(parent).children;
        let position = siblings
            .iter()
            .position(|c| *c == id)
            .unwrap_or_else(|| panic!("node {} missing from its parent's children", id));
        siblings.remove(position);
        self.node_mut(id).parent = None;
        position
    }

    /// Unlink if attached, then free the node, its descendants and any
    /// imported nodes it shadows. Returns the freed records, children first.
    pub fn destroy(&mut self, id: NodeId) -> Vec<DestroyedNode> {
        assert!(!self[id].is_root, "the root node cannot be destroyed");
        let parent = self[id].parent;
        if parent.is_some() {
            self.unlink(id);
        }
        let mut destroyed = Vec::new();
        self.free_subtree(id, parent, &mut destroyed);
        destroyed
    }

    fn free_subtree(&mut self, id: NodeId, parent: Option<NodeId>, out: &mut Vec<DestroyedNode>) {
        let Some(node) = self.arena.remove(id) else {
            return;
        };
        for child in &node.children {
            self.free_subtree(*child, Some(id), out);
        }
        for shadow in &node.replaced {
            self.free_subtree(shadow.node, Some(id), out);
        }
        out.push(DestroyedNode { id, parent, node });
    }

    /// First half of a relocation. Imported content cannot be relocated.
    pub fn move_from(&mut self, id: NodeId) -> Result<usize, ProjectError> {
        if self[id].is_imported {
            return Err(ProjectError::ImportedNode(self.path(id)));
        }
        Ok(self.unlink(id))
    }

    /// Second half of a relocation.
    pub fn move_to(
        &mut self,
        id: NodeId,
        parent: NodeId,
        cmp: Option<&SortFn>,
    ) -> Result<usize, ProjectError> {
        if self[id].is_imported {
            return Err(ProjectError::ImportedNode(self[id].name().to_string()));
        }
        if !self[parent].is_directory() {
            return Err(ProjectError::NotADirectory(self.path(parent)));
        }
        Ok(self.insert(parent, id, cmp))
    }

    /// Apply fetched metadata, reclassifying the node and propagating the
    /// size change. A node becoming a file must have no children left.
    /// Returns the sector delta.
    pub fn set_from_info(&mut self, id: NodeId, update: &InfoUpdate) -> i64 {
        assert!(
            update.kind == NodeKind::Directory || self[id].children.is_empty(),
            "{} still has children and cannot become a file",
            self.path(id)
        );
        let attached = self[id].parent.is_some();
        if attached {
            self.detach_node_stats(id);
        }
        let old = self[id].sectors;
        let node = self.node_mut(id);
        let new = match update.kind {
            NodeKind::File => update.sectors,
            NodeKind::Directory if node.kind == NodeKind::Directory => old,
            NodeKind::Directory => 0,
        };
        node.kind = update.kind;
        node.sectors = new;
        node.is_symlink = update.is_symlink;
        node.symlink_target = update.symlink_target.clone();
        node.is_2gib = update.kind == NodeKind::File && new > TWO_GIB_SECTORS;
        node.state = LoadState::Ready;
        if update.kind == NodeKind::Directory && !node.is_imported {
            node.is_fake = false;
        }
        if attached {
            self.attach_node_stats(id);
        }
        let delta = new as i64 - old as i64;
        self.propagate(id, delta);
        delta
    }

    pub(crate) fn set_state(&mut self, id: NodeId, state: LoadState) {
        self.node_mut(id).state = state;
    }

    /// Change the assumed kind of a node still waiting for metadata.
    pub(crate) fn assume_kind(&mut self, id: NodeId, kind: NodeKind) {
        if self[id].kind == kind {
            return;
        }
        assert!(
            kind == NodeKind::Directory || self[id].children.is_empty(),
            "{} still has children and cannot become a file",
            self.path(id)
        );
        let attached = self[id].parent.is_some();
        if attached {
            self.detach_node_stats(id);
        }
        let old = self[id].sectors as i64;
        let node = self.node_mut(id);
        node.kind = kind;
        node.sectors = 0;
        node.is_2gib = false;
        if attached {
            self.attach_node_stats(id);
        }
        self.propagate(id, -old);
    }

    /// Turn a directory into a fake placeholder keeping its position.
    pub(crate) fn make_fake(&mut self, id: NodeId) {
        assert!(self[id].is_directory(), "only directories become placeholders");
        let node = self.node_mut(id);
        node.is_fake = true;
        node.state = LoadState::Ready;
    }

    /// Turn a virtual sentinel into a regular (fake) directory. Its size
    /// starts counting under its parent.
    pub(crate) fn make_real(&mut self, id: NodeId) {
        if !self[id].is_virtual {
            return;
        }
        let attached = self[id].parent.is_some();
        if attached {
            self.detach_stats(id);
        }
        let node = self.node_mut(id);
        node.is_virtual = false;
        node.is_fake = true;
        if attached {
            self.attach_stats(id);
            let sectors = self[id].sectors as i64;
            self.propagate(id, sectors);
        }
    }

    /// Shadow an imported child of `parent`: detach it and keep it on the
    /// parent's replaced list so it can come back later.
    pub fn save_imported(&mut self, id: NodeId, parent: NodeId) {
        assert!(self[id].is_imported, "{} is not imported", self.path(id));
        assert_eq!(self[id].parent, Some(parent), "{} is not a child of its parent", id);
        let position = self.unlink(id);
        self.node_mut(parent)
            .replaced
            .push(ShadowedImport { node: id, position });
    }

    /// Splice back the imported node called `name` shadowed under `parent`.
    pub fn restore_imported(
        &mut self,
        parent: NodeId,
        name: &str,
        cmp: Option<&SortFn>,
    ) -> Option<NodeId> {
        let index = self[parent]
            .replaced
            .iter()
            .position(|s| self[s.node].name() == name)?;
        let shadow = self.node_mut(parent).replaced.remove(index);
        if cmp.is_some() {
            self.insert(parent, shadow.node, cmp);
        } else {
            let limit = self.insert_position(parent, shadow.node, None);
            self.link_at(parent, shadow.node, shadow.position.min(limit));
        }
        Some(shadow.node)
    }

    /// Graft a node to `uri`. Its size stops counting under its parent.
    pub(crate) fn set_graft(&mut self, id: NodeId, uri: Arc<str>) {
        assert!(!self[id].is_root, "the root cannot be grafted");
        if let NodeName::Grafted(graft) = &mut self.node_mut(id).name {
            graft.uri = uri;
            return;
        }
        let sectors = self[id].sectors as i64;
        self.propagate(id, -sectors);
        let node = self.node_mut(id);
        let name = node.name().to_string();
        node.name = NodeName::Grafted(Graft { name, uri });
    }

    /// Remove a node's graft record. Its size counts under its parent again.
    pub(crate) fn clear_graft(&mut self, id: NodeId) -> Option<Arc<str>> {
        let node = self.node_mut(id);
        let graft = match &node.name {
            NodeName::Grafted(graft) => graft.clone(),
            NodeName::Plain(_) => return None,
        };
        node.name = NodeName::Plain(graft.name);
        let sectors = node.sectors as i64;
        self.propagate(id, sectors);
        Some(graft.uri)
    }

    pub(crate) fn rename(&mut self, id: NodeId, name: &str) {
        self.node_mut(id).set_name(name);
    }

    pub(crate) fn set_hidden(&mut self, id: NodeId, hidden: bool) {
        self.node_mut(id).is_hidden = hidden;
    }

    /// Imported directories stop being placeholders once explored.
    pub(crate) fn mark_explored(&mut self, id: NodeId) {
        let node = self.node_mut(id);
        node.is_fake = false;
        node.is_exploring = false;
    }

    pub(crate) fn set_exploring(&mut self, id: NodeId, exploring: bool) {
        self.node_mut(id).is_exploring = exploring;
    }

    pub(crate) fn set_monitored(&mut self, id: NodeId, uri: Option<Arc<str>>) {
        self.node_mut(id).monitored = uri;
    }

    /// Move a node to where the comparator wants it among its siblings.
    /// Returns the old and new indexes when it moved.
    pub fn reposition(&mut self, id: NodeId, cmp: Option<&SortFn>) -> Option<(usize, usize)> {
        cmp?;
        let parent = self[id].parent?;
        let old = self[parent].children.iter().position(|c| *c == id)?;
        self.node_mut(parent).children.remove(old);
        let new = self.insert_position(parent, id, cmp);
        self.node_mut(parent).children.insert(new, id);
        (old != new).then_some((old, new))
    }

    /// Stable-sort the children of `parent`, hidden nodes last.
    ///
    /// Returns `order` with `order[new_index] == old_index`, or `None`
    /// when nothing moved.
    pub fn sort_children(&mut self, parent: NodeId, cmp: &SortFn) -> Option<Vec<usize>> {
        let children = self[parent].children.clone();
        let mut order: Vec<usize> = (0..children.len()).collect();
        order.sort_by(|a, b| {
            let na = &self[children[*a]];
            let nb = &self[children[*b]];
            na.is_hidden.cmp(&nb.is_hidden).then_with(|| cmp(na, nb))
        });
        if order.iter().enumerate().all(|(i, old)| i == *old) {
            return None;
        }
        self.node_mut(parent).children = order.iter().map(|i| children[*i]).collect();
        Some(order)
    }

    /// Reverse the visible children of `parent`; hidden ones stay last.
    pub fn reverse_children(&mut self, parent: NodeId) -> Option<Vec<usize>> {
        let children = self[parent].children.clone();
        let hidden_start = children
            .iter()
            .position(|c| self[*c].is_hidden)
            .unwrap_or(children.len());
        if hidden_start < 2 {
            return None;
        }
        let mut order: Vec<usize> = (0..hidden_start).rev().collect();
        order.extend(hidden_start..children.len());
        self.node_mut(parent).children = order.iter().map(|i| children[*i]).collect();
        Some(order)
    }

    /// Statistics recomputed by a full traversal.
    pub fn recount(&self) -> TreeStats {
        let mut stats = TreeStats::default();
        self.recount_rec(self.root, 0, false, &mut stats);
        stats
    }

    fn recount_rec(&self, id: NodeId, depth: usize, ancestor_deep: bool, stats: &mut TreeStats) {
        let node = &self[id];
        let mut deep_below = ancestor_deep;
        if !node.is_root && !node.is_virtual {
            if node.is_directory() {
                stats.num_dir += 1;
            } else if node.is_symlink {
                stats.num_sym += 1;
            } else {
                stats.num_file += 1;
            }
            if node.is_file() && node.sectors > TWO_GIB_SECTORS {
                stats.num_2gib += 1;
            }
            if !ancestor_deep && FileNode::exceeds_depth(node.kind, depth) {
                stats.num_deep += 1;
                deep_below = true;
            }
        }
        for child in &node.children {
            self.recount_rec(*child, depth + 1, deep_below, stats);
        }
    }

    /// Check every structural invariant: parent links, incremental
    /// statistics and directory sector sums.
    pub fn verify(&self) -> Result<(), String> {
        let recount = self.recount();
        if recount != self.stats {
            return Err(format!(
                "statistics drifted: kept {:?}, traversal {:?}",
                self.stats, recount
            ));
        }
        for id in self.descendants(self.root) {
            let node = &self[id];
            for child in &node.children {
                if self[*child].parent != Some(id) {
                    return Err(format!("{} has a wrong parent link", self.path(*child)));
                }
            }
            if node.is_directory() && !node.is_virtual {
                let expected: u64 = node
                    .children
                    .iter()
                    .map(|c| &self[*c])
                    .filter(|c| !c.is_grafted() && !c.is_virtual)
                    .map(|c| c.sectors)
                    .sum();
                if expected != node.sectors {
                    return Err(format!(
                        "{} counts {} sectors, children sum to {}",
                        self.path(id),
                        node.sectors,
                        expected
                    ));
                }
            }
        }
        Ok(())
    }
}
